//! Graph export and import.
//!
//! The export is a self-contained JSON document:
//!
//! ```json
//! {
//!   "metadata": { "version": "...", "export_timestamp": "...", "schema_revision": 1 },
//!   "nodes": [ { "id": "...", "labels": ["Chunk"], "properties": { ... } } ],
//!   "relationships": [ { "id": "...", "type": "HAS_CHUNK", "start_id": "...", "end_id": "...", "properties": { ... } } ],
//!   "statistics": { ... }
//! }
//! ```
//!
//! Embeddings are serialized as `{"_type": "vector", "dimension": D,
//! "values": [...]}`. Importing an export into an empty store restores a
//! graph that answers queries identically to the source.

use super::GraphStore;
use crate::error::{StoreError, StoreResult};
use crate::graph::{
    Chunk, ChunkId, ChunkType, ContainsEntity, Document, DocumentId, DocumentStatus, Entity,
    EntityKey, EntityPair, EntityType, RelatedTo,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Schema revision stamped into exports; bump on breaking layout change.
const SCHEMA_REVISION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub version: String,
    pub export_timestamp: DateTime<Utc>,
    pub schema_revision: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start_id: String,
    pub end_id: String,
    pub properties: serde_json::Map<String, Value>,
}

/// Top-level export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub metadata: ExportMetadata,
    pub nodes: Vec<ExportNode>,
    pub relationships: Vec<ExportRelationship>,
    pub statistics: HashMap<String, u64>,
}

fn vector_value(embedding: &[f32]) -> Value {
    json!({
        "_type": "vector",
        "dimension": embedding.len(),
        "values": embedding,
    })
}

fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    if value.get("_type")?.as_str()? != "vector" {
        return None;
    }
    let values = value.get("values")?.as_array()?;
    Some(values.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
}

fn doc_node_id(id: &DocumentId) -> String {
    format!("doc:{}", id.as_str())
}

fn chunk_node_id(id: &ChunkId) -> String {
    format!("chunk:{}", id.as_str())
}

fn entity_node_id(key: &EntityKey) -> String {
    format!("entity:{}:{}", key.entity_type.as_str(), key.normalized)
}

/// Export the full graph from a store.
pub fn export_graph(store: &dyn GraphStore) -> StoreResult<GraphExport> {
    let mut nodes = Vec::new();
    let mut relationships = Vec::new();
    let mut rel_seq = 0u64;
    let mut next_rel_id = |rel_type: &str| {
        rel_seq += 1;
        format!("rel:{rel_type}:{rel_seq}")
    };

    for doc in store.list_documents()? {
        let mut props = serde_json::Map::new();
        props.insert("filename".into(), json!(doc.filename));
        props.insert("total_pages".into(), json!(doc.total_pages));
        props.insert("category".into(), json!(doc.category));
        props.insert("division".into(), json!(doc.division));
        props.insert("chunk_count".into(), json!(doc.chunk_count));
        props.insert("status".into(), json!(doc.status.as_str()));
        props.insert(
            "ingested_at".into(),
            json!(doc.ingested_at.map(|d| d.to_rfc3339())),
        );
        nodes.push(ExportNode {
            id: doc_node_id(&doc.id),
            labels: vec!["Document".into()],
            properties: props,
        });

        for chunk in store.chunks_for_document(&doc.id)? {
            let mut props = serde_json::Map::new();
            props.insert("text".into(), json!(chunk.text));
            props.insert("page_num".into(), json!(chunk.page_num));
            props.insert("chunk_index".into(), json!(chunk.chunk_index));
            props.insert("token_count".into(), json!(chunk.token_count));
            props.insert("embedding".into(), vector_value(&chunk.embedding));
            props.insert("semantic_density".into(), json!(chunk.semantic_density));
            props.insert("chunk_type".into(), json!(chunk.chunk_type.as_str()));
            props.insert("has_definitions".into(), json!(chunk.has_definitions));
            props.insert("has_examples".into(), json!(chunk.has_examples));
            props.insert("keywords".into(), json!(chunk.keywords));
            nodes.push(ExportNode {
                id: chunk_node_id(&chunk.id),
                labels: vec!["Chunk".into()],
                properties: props,
            });

            relationships.push(ExportRelationship {
                id: next_rel_id("HAS_CHUNK"),
                rel_type: "HAS_CHUNK".into(),
                start_id: doc_node_id(&doc.id),
                end_id: chunk_node_id(&chunk.id),
                properties: serde_json::Map::new(),
            });

            for mention in store.mentions_for_chunk(&chunk.id)? {
                let mut props = serde_json::Map::new();
                props.insert("confidence".into(), json!(mention.confidence));
                relationships.push(ExportRelationship {
                    id: next_rel_id("CONTAINS_ENTITY"),
                    rel_type: "CONTAINS_ENTITY".into(),
                    start_id: chunk_node_id(&chunk.id),
                    end_id: entity_node_id(&mention.entity),
                    properties: props,
                });
            }
        }

        for link in store.next_chunks(&doc.id)? {
            relationships.push(ExportRelationship {
                id: next_rel_id("NEXT_CHUNK"),
                rel_type: "NEXT_CHUNK".into(),
                start_id: chunk_node_id(&link.from),
                end_id: chunk_node_id(&link.to),
                properties: serde_json::Map::new(),
            });
        }
    }

    for entity in store.all_entities()? {
        let mut props = serde_json::Map::new();
        props.insert("text".into(), json!(entity.surface));
        props.insert("normalized".into(), json!(entity.key.normalized));
        props.insert("type".into(), json!(entity.key.entity_type.as_str()));
        props.insert("first_seen".into(), json!(entity.first_seen.to_rfc3339()));
        props.insert("occurrences".into(), json!(entity.occurrences));
        props.insert("community_id".into(), json!(entity.community_id));
        props.insert("degree_centrality".into(), json!(entity.degree_centrality));
        props.insert(
            "betweenness_centrality".into(),
            json!(entity.betweenness_centrality),
        );
        props.insert("is_bridge".into(), json!(entity.is_bridge));
        props.insert(
            "connected_communities".into(),
            json!(entity.connected_communities),
        );
        nodes.push(ExportNode {
            id: entity_node_id(&entity.key),
            labels: vec!["Entity".into()],
            properties: props,
        });
    }

    for edge in store.related_edges()? {
        let mut props = serde_json::Map::new();
        props.insert("strength".into(), json!(edge.strength));
        relationships.push(ExportRelationship {
            id: next_rel_id("RELATED_TO"),
            rel_type: "RELATED_TO".into(),
            start_id: entity_node_id(edge.pair.first()),
            end_id: entity_node_id(edge.pair.second()),
            properties: props,
        });
    }

    let summary = store.schema_summary()?;
    let mut statistics: HashMap<String, u64> = HashMap::new();
    for (label, n) in &summary.labels {
        statistics.insert(format!("nodes_{}", label.to_lowercase()), *n);
    }
    for (rel, n) in &summary.relationships {
        statistics.insert(format!("rels_{}", rel.to_lowercase()), *n);
    }

    Ok(GraphExport {
        metadata: ExportMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            export_timestamp: Utc::now(),
            schema_revision: SCHEMA_REVISION,
        },
        nodes,
        relationships,
        statistics,
    })
}

fn get_str(props: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    props.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn get_u32(props: &serde_json::Map<String, Value>, key: &str) -> u32 {
    props.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32
}

fn get_f32(props: &serde_json::Map<String, Value>, key: &str) -> f32 {
    props.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0) as f32
}

fn get_bool(props: &serde_json::Map<String, Value>, key: &str) -> bool {
    props.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn entity_key_from_node_id(id: &str) -> Option<EntityKey> {
    let rest = id.strip_prefix("entity:")?;
    let (type_str, normalized) = rest.split_once(':')?;
    Some(EntityKey::new(normalized, EntityType::parse(type_str)?))
}

/// Import a previously exported graph into a store. The target is
/// expected to be empty; node ids collide with existing rows otherwise.
pub fn import_graph(store: &dyn GraphStore, export: &GraphExport) -> StoreResult<()> {
    if export.metadata.schema_revision != SCHEMA_REVISION {
        return Err(StoreError::Invariant(format!(
            "unsupported schema revision {}",
            export.metadata.schema_revision
        )));
    }

    // Documents first: chunks reference them.
    for node in export.nodes.iter().filter(|n| n.labels.iter().any(|l| l == "Document")) {
        let id = node
            .id
            .strip_prefix("doc:")
            .ok_or_else(|| StoreError::Invariant(format!("bad document node id: {}", node.id)))?;
        let status = get_str(&node.properties, "status")
            .and_then(|s| DocumentStatus::parse(&s))
            .unwrap_or(DocumentStatus::Ingested);
        let doc = Document {
            id: DocumentId::from_string(id),
            filename: get_str(&node.properties, "filename").unwrap_or_else(|| id.to_string()),
            total_pages: get_u32(&node.properties, "total_pages"),
            category: get_str(&node.properties, "category"),
            division: get_str(&node.properties, "division"),
            chunk_count: get_u32(&node.properties, "chunk_count"),
            status,
            ingested_at: get_str(&node.properties, "ingested_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
        };
        store.upsert_document(&doc)?;
    }

    for node in export.nodes.iter().filter(|n| n.labels.iter().any(|l| l == "Chunk")) {
        let id = node
            .id
            .strip_prefix("chunk:")
            .ok_or_else(|| StoreError::Invariant(format!("bad chunk node id: {}", node.id)))?;
        let chunk_id = ChunkId::from_string(id);
        // Owner comes from the id layout "{doc}#{index}".
        let doc_part = id
            .rsplit_once('#')
            .map(|(d, _)| d)
            .ok_or_else(|| StoreError::Invariant(format!("bad chunk id layout: {id}")))?;
        let embedding = node
            .properties
            .get("embedding")
            .and_then(parse_vector)
            .unwrap_or_default();
        let chunk = Chunk {
            id: chunk_id,
            document_id: DocumentId::from_string(doc_part),
            text: get_str(&node.properties, "text").unwrap_or_default(),
            page_num: get_u32(&node.properties, "page_num"),
            chunk_index: get_u32(&node.properties, "chunk_index"),
            token_count: get_u32(&node.properties, "token_count"),
            embedding,
            semantic_density: get_f32(&node.properties, "semantic_density"),
            chunk_type: get_str(&node.properties, "chunk_type")
                .and_then(|s| ChunkType::parse(&s))
                .unwrap_or(ChunkType::Content),
            has_definitions: get_bool(&node.properties, "has_definitions"),
            has_examples: get_bool(&node.properties, "has_examples"),
            keywords: node
                .properties
                .get("keywords")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
        };
        store.upsert_chunk(&chunk)?;
    }

    for node in export.nodes.iter().filter(|n| n.labels.iter().any(|l| l == "Entity")) {
        let key = entity_key_from_node_id(&node.id)
            .ok_or_else(|| StoreError::Invariant(format!("bad entity node id: {}", node.id)))?;
        let entity = Entity {
            surface: get_str(&node.properties, "text").unwrap_or_else(|| key.normalized.clone()),
            key,
            first_seen: get_str(&node.properties, "first_seen")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            occurrences: get_u32(&node.properties, "occurrences").max(1),
            community_id: node.properties.get("community_id").and_then(|v| v.as_i64()),
            degree_centrality: node
                .properties
                .get("degree_centrality")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            betweenness_centrality: node
                .properties
                .get("betweenness_centrality")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            is_bridge: get_bool(&node.properties, "is_bridge"),
            connected_communities: get_u32(&node.properties, "connected_communities"),
        };
        store.restore_entity(&entity)?;
    }

    let mut related = Vec::new();
    for rel in &export.relationships {
        match rel.rel_type.as_str() {
            // HAS_CHUNK is implicit in the chunk's owner column.
            "HAS_CHUNK" => {}
            "NEXT_CHUNK" => {
                let from = rel.start_id.strip_prefix("chunk:").ok_or_else(|| {
                    StoreError::Invariant(format!("bad NEXT_CHUNK start: {}", rel.start_id))
                })?;
                let to = rel.end_id.strip_prefix("chunk:").ok_or_else(|| {
                    StoreError::Invariant(format!("bad NEXT_CHUNK end: {}", rel.end_id))
                })?;
                store.link_next_chunk(&ChunkId::from_string(from), &ChunkId::from_string(to))?;
            }
            "CONTAINS_ENTITY" => {
                let chunk = rel.start_id.strip_prefix("chunk:").ok_or_else(|| {
                    StoreError::Invariant(format!("bad CONTAINS_ENTITY start: {}", rel.start_id))
                })?;
                let entity = entity_key_from_node_id(&rel.end_id).ok_or_else(|| {
                    StoreError::Invariant(format!("bad CONTAINS_ENTITY end: {}", rel.end_id))
                })?;
                store.link_contains_entity(&ContainsEntity {
                    chunk_id: ChunkId::from_string(chunk),
                    entity,
                    confidence: get_f32(&rel.properties, "confidence"),
                })?;
            }
            "RELATED_TO" => {
                let a = entity_key_from_node_id(&rel.start_id).ok_or_else(|| {
                    StoreError::Invariant(format!("bad RELATED_TO start: {}", rel.start_id))
                })?;
                let b = entity_key_from_node_id(&rel.end_id).ok_or_else(|| {
                    StoreError::Invariant(format!("bad RELATED_TO end: {}", rel.end_id))
                })?;
                if let Some(pair) = EntityPair::new(a, b) {
                    related.push(RelatedTo {
                        pair,
                        strength: get_u32(&rel.properties, "strength"),
                    });
                }
            }
            other => {
                return Err(StoreError::Invariant(format!(
                    "unknown relationship type in export: {other}"
                )))
            }
        }
    }
    if !related.is_empty() {
        store.replace_related_edges(&related)?;
    }

    Ok(())
}

/// Convenience: both directions as JSON strings.
impl GraphExport {
    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentWrite, EntityMention, SearchFilter, SqliteStore};
    use crate::store::vector::l2_normalize;

    const DIM: usize = 4;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory(DIM).unwrap();
        let doc = Document::new("export_me.pdf", 2).with_category("fx");
        let id = doc.id.clone();
        let mut emb = vec![0.6, 0.8, 0.0, 0.0];
        l2_normalize(&mut emb);
        let chunk = Chunk {
            id: ChunkId::new(&id, 0),
            document_id: id.clone(),
            text: "An FX Forward is a contract.".into(),
            page_num: 1,
            chunk_index: 0,
            token_count: 6,
            embedding: emb,
            semantic_density: 0.8,
            chunk_type: ChunkType::Definition,
            has_definitions: true,
            has_examples: false,
            keywords: vec!["forward".into()],
        };
        store
            .commit_document(&DocumentWrite {
                document: doc,
                chunks: vec![(
                    chunk,
                    vec![EntityMention {
                        surface: "FX Forward".into(),
                        key: EntityKey::new("fx_forward", EntityType::Product),
                        confidence: 0.85,
                    }],
                )],
            })
            .unwrap();
        store
    }

    #[test]
    fn export_contains_all_node_labels() {
        let store = seeded_store();
        let export = export_graph(&store).unwrap();

        let labels: Vec<&str> = export
            .nodes
            .iter()
            .flat_map(|n| n.labels.iter().map(|l| l.as_str()))
            .collect();
        assert!(labels.contains(&"Document"));
        assert!(labels.contains(&"Chunk"));
        assert!(labels.contains(&"Entity"));
        assert_eq!(export.metadata.schema_revision, SCHEMA_REVISION);
    }

    #[test]
    fn embeddings_serialize_as_tagged_vectors() {
        let store = seeded_store();
        let export = export_graph(&store).unwrap();

        let chunk_node = export
            .nodes
            .iter()
            .find(|n| n.labels.iter().any(|l| l == "Chunk"))
            .unwrap();
        let emb = &chunk_node.properties["embedding"];
        assert_eq!(emb["_type"], "vector");
        assert_eq!(emb["dimension"], DIM);
        assert_eq!(emb["values"].as_array().unwrap().len(), DIM);
    }

    #[test]
    fn round_trip_restores_equivalent_graph() {
        let source = seeded_store();
        let export = export_graph(&source).unwrap();

        let target = SqliteStore::open_in_memory(DIM).unwrap();
        import_graph(&target, &export).unwrap();

        let doc_id = DocumentId::from_string("export_me");
        let doc = target.load_document(&doc_id).unwrap().unwrap();
        assert_eq!(doc.chunk_count, 1);
        assert_eq!(doc.category.as_deref(), Some("fx"));

        let chunks = target.chunks_for_document(&doc_id).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Definition);
        assert_eq!(chunks[0].embedding.len(), DIM);

        let entity = target
            .entity_lookup(&EntityKey::new("fx_forward", EntityType::Product))
            .unwrap()
            .unwrap();
        assert_eq!(entity.occurrences, 1);

        // Keyword search behaves identically on the restored graph.
        let hits = target
            .keyword_search_chunks(&["forward".to_string()], &SearchFilter::default(), 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn json_round_trip() {
        let store = seeded_store();
        let export = export_graph(&store).unwrap();
        let json = export.to_json().unwrap();
        let parsed = GraphExport::from_json(&json).unwrap();
        assert_eq!(parsed.nodes.len(), export.nodes.len());
        assert_eq!(parsed.relationships.len(), export.relationships.len());
    }
}
