//! Vector helpers and the optional sqlite-vec ANN index.
//!
//! Embeddings are L2-normalized before storage so cosine similarity
//! equals the dot product. The default build searches by linear scan
//! over stored blobs; the `embeddings` feature adds a vec0 virtual
//! table for true KNN.

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product; equals cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity with explicit normalization, for vectors that may
/// not be unit length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Serialize an f32 slice to little-endian bytes for BLOB storage.
pub fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Deserialize a BLOB back into an f32 vector.
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(feature = "embeddings")]
mod ann {
    use super::{l2_normalize, vector_to_blob};
    use rusqlite::Connection;
    use sqlite_vec::sqlite3_vec_init;
    use std::sync::Once;

    /// Register the sqlite-vec extension globally (safe under parallel
    /// test execution).
    pub fn register_vec_extension() {
        static INIT: Once = Once::new();
        INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        });
    }

    /// Create the vec0 virtual table for chunk embeddings.
    pub fn init_ann_table(conn: &Connection, dimensions: usize) -> rusqlite::Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors USING vec0(\
                 chunk_id TEXT,\
                 embedding float[{dimensions}]\
             )"
        );
        conn.execute_batch(&sql)
    }

    /// Upsert a chunk vector into the ANN table.
    pub fn store_vector(conn: &Connection, chunk_id: &str, vector: &[f32]) -> rusqlite::Result<()> {
        let mut normalized = vector.to_vec();
        l2_normalize(&mut normalized);
        conn.execute(
            "DELETE FROM chunk_vectors WHERE chunk_id = ?1",
            rusqlite::params![chunk_id],
        )?;
        conn.execute(
            "INSERT INTO chunk_vectors(chunk_id, embedding) VALUES (?1, ?2)",
            rusqlite::params![chunk_id, vector_to_blob(&normalized)],
        )?;
        Ok(())
    }

    /// KNN query returning (chunk_id, cosine similarity).
    ///
    /// vec0 reports L2 distance; for unit vectors
    /// `dist^2 = 2(1 - cos)`, so `cos = 1 - dist^2 / 2`.
    pub fn knn(
        conn: &Connection,
        query: &[f32],
        k: usize,
    ) -> rusqlite::Result<Vec<(String, f32)>> {
        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);
        let mut stmt = conn.prepare(
            "SELECT chunk_id, distance FROM chunk_vectors \
             WHERE embedding MATCH ?1 AND k = ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![vector_to_blob(&normalized), k as i64],
            |row| {
                let id: String = row.get(0)?;
                let distance: f32 = row.get(1)?;
                Ok((id, 1.0 - (distance * distance) / 2.0))
            },
        )?;
        rows.collect()
    }
}

#[cfg(feature = "embeddings")]
pub use ann::{init_ann_table, knn, register_vec_extension, store_vector};
