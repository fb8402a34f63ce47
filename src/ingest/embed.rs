//! Text embedding behind a trait.
//!
//! `Embedder` is deterministic: the same text maps to the same vector
//! regardless of batch composition. Outputs are L2-normalized so cosine
//! similarity equals dot product. Production wraps fastembed (ONNX)
//! behind the `embeddings` feature; tests use deterministic mocks.

use crate::error::ModelError;
use crate::store::vector::l2_normalize;

/// Deterministic batch encoder into fixed-dimension unit vectors.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per text, each of
    /// `dimension()` length and unit norm.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// The fixed output dimension.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors.pop().ok_or(ModelError::EmptyResult)
    }
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Production embedder backed by fastembed.
    ///
    /// `TextEmbedding::embed` needs `&mut self`, so the model sits in a
    /// mutex; inference is serialized per process, which matches the
    /// load-once model lifecycle.
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
        dimension: usize,
    }

    impl FastEmbedder {
        pub fn new(model: EmbeddingModel, dimension: usize) -> Result<Self, ModelError> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| ModelError::Unavailable(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
                dimension,
            })
        }

        /// The reference model: bge-small-en-v1.5, 384 dimensions.
        pub fn default_model() -> Result<Self, ModelError> {
            Self::new(EmbeddingModel::BGESmallENV15, 384)
        }
    }

    impl Embedder for FastEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self.model.lock().unwrap();
            let mut vectors = model
                .embed(texts.to_vec(), None)
                .map_err(|e| ModelError::Unavailable(e.to_string()))?;
            if vectors.is_empty() {
                return Err(ModelError::EmptyResult);
            }
            for v in &mut vectors {
                l2_normalize(v);
            }
            Ok(vectors)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedder;

/// Deterministic hash-based embedder. Not semantically meaningful, but
/// batch-independent and unit-norm; the fallback when no model backend
/// is configured, and a baseline for tests that don't need controlled
/// similarities.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dimension];
                for token in text.split_whitespace() {
                    let token = token.to_lowercase();
                    // FNV-1a over the token selects a bucket and sign.
                    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
                    for b in token.bytes() {
                        hash ^= b as u64;
                        hash = hash.wrapping_mul(0x100_0000_01b3);
                    }
                    let bucket = (hash % self.dimension as u64) as usize;
                    let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
                    v[bucket] += sign;
                }
                l2_normalize(&mut v);
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::vector::dot;

    #[test]
    fn hash_embedder_is_batch_independent() {
        let embedder = HashEmbedder::new(16);
        let alone = embedder.embed_one("option premium").unwrap();
        let batched = embedder
            .embed_batch(&["unrelated text", "option premium", "more text"])
            .unwrap();
        assert_eq!(alone, batched[1]);
    }

    #[test]
    fn hash_embedder_outputs_unit_vectors() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed_one("settlement date conventions").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn identical_texts_have_identical_vectors() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed_one("margin call").unwrap();
        let b = embedder.embed_one("margin call").unwrap();
        assert!((dot(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_batch_is_empty() {
        let embedder = HashEmbedder::new(16);
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }
}
