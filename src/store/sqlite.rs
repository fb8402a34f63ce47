//! SQLite storage backend.
//!
//! A single database file holds documents, chunks (with embedding
//! blobs), entities, and the relationship tables. Thread-safe via an
//! internal mutex on the connection; WAL mode for concurrent reads
//! during writes. The full write of one document goes through a single
//! transaction so a failed ingestion leaves no trace.

use super::{
    DocumentWrite, EntityMetrics, GraphStore, SchemaSummary, SearchFilter,
};
use crate::error::{StoreError, StoreResult};
use crate::graph::{
    Chunk, ChunkId, ChunkType, ContainsEntity, Document, DocumentId, DocumentStatus, Entity,
    EntityKey, EntityPair, EntityType, NextChunk, RelatedTo,
};
#[cfg(not(feature = "embeddings"))]
use crate::store::vector::dot;
use crate::store::vector::{blob_to_vector, vector_to_blob};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed graph store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Fixed embedding dimension; enforced on every chunk write.
    dimensions: usize,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        #[cfg(feature = "embeddings")]
        crate::store::vector::register_vec_extension();

        let conn = Connection::open(path)?;
        Self::init_schema(&conn, dimensions)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    /// Create an in-memory store (tests).
    pub fn open_in_memory(dimensions: usize) -> StoreResult<Self> {
        #[cfg(feature = "embeddings")]
        crate::store::vector::register_vec_extension();

        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn, dimensions)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn init_schema(conn: &Connection, _dimensions: usize) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                total_pages INTEGER NOT NULL,
                category TEXT,
                division TEXT,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                ingested_at TEXT
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                page_num INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                embedding BLOB,
                semantic_density REAL NOT NULL,
                chunk_type TEXT NOT NULL,
                has_definitions INTEGER NOT NULL,
                has_examples INTEGER NOT NULL,
                keywords_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_document
                ON chunks(document_id, chunk_index);
            CREATE INDEX IF NOT EXISTS idx_chunks_page
                ON chunks(page_num);

            CREATE TABLE IF NOT EXISTS next_chunk (
                from_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
                to_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS entities (
                normalized TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                surface TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                occurrences INTEGER NOT NULL DEFAULT 1,
                community_id INTEGER,
                degree_centrality REAL NOT NULL DEFAULT 0,
                betweenness_centrality REAL NOT NULL DEFAULT 0,
                is_bridge INTEGER NOT NULL DEFAULT 0,
                connected_communities INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (normalized, entity_type)
            );
            CREATE INDEX IF NOT EXISTS idx_entities_community
                ON entities(community_id);
            CREATE INDEX IF NOT EXISTS idx_entities_bridge
                ON entities(is_bridge);

            CREATE TABLE IF NOT EXISTS chunk_entities (
                chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
                normalized TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                PRIMARY KEY (chunk_id, normalized, entity_type)
            );
            CREATE INDEX IF NOT EXISTS idx_chunk_entities_entity
                ON chunk_entities(normalized, entity_type);

            CREATE TABLE IF NOT EXISTS related_to (
                a_normalized TEXT NOT NULL,
                a_type TEXT NOT NULL,
                b_normalized TEXT NOT NULL,
                b_type TEXT NOT NULL,
                strength INTEGER NOT NULL,
                PRIMARY KEY (a_normalized, a_type, b_normalized, b_type)
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_id UNINDEXED,
                text
            );
            "#,
        )?;

        #[cfg(feature = "embeddings")]
        crate::store::vector::init_ann_table(conn, _dimensions)?;

        Ok(())
    }

    // === Row mapping ===

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        let status: String = row.get("status")?;
        let ingested_at: Option<String> = row.get("ingested_at")?;
        Ok(Document {
            id: DocumentId::from_string(row.get::<_, String>("id")?),
            filename: row.get("filename")?,
            total_pages: row.get("total_pages")?,
            category: row.get("category")?,
            division: row.get("division")?,
            chunk_count: row.get("chunk_count")?,
            status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Failed),
            ingested_at: ingested_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
        })
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
        let chunk_type: String = row.get("chunk_type")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        let keywords_json: String = row.get("keywords_json")?;
        Ok(Chunk {
            id: ChunkId::from_string(row.get::<_, String>("id")?),
            document_id: DocumentId::from_string(row.get::<_, String>("document_id")?),
            text: row.get("text")?,
            page_num: row.get("page_num")?,
            chunk_index: row.get("chunk_index")?,
            token_count: row.get("token_count")?,
            embedding: embedding.map(|b| blob_to_vector(&b)).unwrap_or_default(),
            semantic_density: row.get("semantic_density")?,
            chunk_type: ChunkType::parse(&chunk_type).unwrap_or(ChunkType::Content),
            has_definitions: row.get("has_definitions")?,
            has_examples: row.get("has_examples")?,
            keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        })
    }

    fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
        let entity_type: String = row.get("entity_type")?;
        let first_seen: String = row.get("first_seen")?;
        Ok(Entity {
            surface: row.get("surface")?,
            key: EntityKey::new(
                row.get::<_, String>("normalized")?,
                EntityType::parse(&entity_type).unwrap_or(EntityType::Other),
            ),
            first_seen: DateTime::parse_from_rfc3339(&first_seen)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            occurrences: row.get("occurrences")?,
            community_id: row.get("community_id")?,
            degree_centrality: row.get("degree_centrality")?,
            betweenness_centrality: row.get("betweenness_centrality")?,
            is_bridge: row.get("is_bridge")?,
            connected_communities: row.get("connected_communities")?,
        })
    }

    const CHUNK_COLS: &'static str = "id, document_id, text, page_num, chunk_index, token_count, \
         embedding, semantic_density, chunk_type, has_definitions, has_examples, keywords_json";

    /// `CHUNK_COLS` qualified with the `c` alias for joined queries.
    const CHUNK_COLS_Q: &'static str = "c.id, c.document_id, c.text, c.page_num, c.chunk_index, \
         c.token_count, c.embedding, c.semantic_density, c.chunk_type, c.has_definitions, \
         c.has_examples, c.keywords_json";

    const ENTITY_COLS: &'static str = "normalized, entity_type, surface, first_seen, occurrences, \
         community_id, degree_centrality, betweenness_centrality, is_bridge, connected_communities";

    // === Write helpers shared by trait methods and commit_document ===

    fn write_document(conn: &Connection, doc: &Document) -> StoreResult<()> {
        conn.execute(
            r#"
            INSERT INTO documents (id, filename, total_pages, category, division,
                                   chunk_count, status, ingested_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                total_pages = excluded.total_pages,
                category = excluded.category,
                division = excluded.division,
                chunk_count = excluded.chunk_count,
                status = excluded.status,
                ingested_at = excluded.ingested_at
            "#,
            params![
                doc.id.as_str(),
                doc.filename,
                doc.total_pages,
                doc.category,
                doc.division,
                doc.chunk_count,
                doc.status.as_str(),
                doc.ingested_at.map(|d| d.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn write_chunk(conn: &Connection, chunk: &Chunk, dimensions: usize) -> StoreResult<()> {
        if !chunk.embedding.is_empty() && chunk.embedding.len() != dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: dimensions,
                got: chunk.embedding.len(),
            });
        }
        let embedding = if chunk.embedding.is_empty() {
            None
        } else {
            Some(vector_to_blob(&chunk.embedding))
        };
        conn.execute(
            r#"
            INSERT INTO chunks (id, document_id, text, page_num, chunk_index, token_count,
                                embedding, semantic_density, chunk_type, has_definitions,
                                has_examples, keywords_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                page_num = excluded.page_num,
                chunk_index = excluded.chunk_index,
                token_count = excluded.token_count,
                embedding = excluded.embedding,
                semantic_density = excluded.semantic_density,
                chunk_type = excluded.chunk_type,
                has_definitions = excluded.has_definitions,
                has_examples = excluded.has_examples,
                keywords_json = excluded.keywords_json
            "#,
            params![
                chunk.id.as_str(),
                chunk.document_id.as_str(),
                chunk.text,
                chunk.page_num,
                chunk.chunk_index,
                chunk.token_count,
                embedding,
                chunk.semantic_density,
                chunk.chunk_type.as_str(),
                chunk.has_definitions,
                chunk.has_examples,
                serde_json::to_string(&chunk.keywords)?,
            ],
        )?;

        // Keep the full-text index in step with the row.
        conn.execute(
            "DELETE FROM chunks_fts WHERE chunk_id = ?1",
            params![chunk.id.as_str()],
        )?;
        conn.execute(
            "INSERT INTO chunks_fts (chunk_id, text) VALUES (?1, ?2)",
            params![chunk.id.as_str(), chunk.text],
        )?;

        #[cfg(feature = "embeddings")]
        if !chunk.embedding.is_empty() {
            crate::store::vector::store_vector(conn, chunk.id.as_str(), &chunk.embedding)?;
        }

        Ok(())
    }

    fn write_entity(conn: &Connection, surface: &str, key: &EntityKey) -> StoreResult<()> {
        conn.execute(
            r#"
            INSERT INTO entities (normalized, entity_type, surface, first_seen, occurrences)
            VALUES (?1, ?2, ?3, ?4, 1)
            ON CONFLICT(normalized, entity_type) DO UPDATE SET
                occurrences = occurrences + 1
            "#,
            params![
                key.normalized,
                key.entity_type.as_str(),
                surface,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn write_contains(conn: &Connection, link: &ContainsEntity) -> StoreResult<()> {
        conn.execute(
            r#"
            INSERT INTO chunk_entities (chunk_id, normalized, entity_type, confidence)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(chunk_id, normalized, entity_type) DO UPDATE SET
                confidence = MAX(confidence, excluded.confidence)
            "#,
            params![
                link.chunk_id.as_str(),
                link.entity.normalized,
                link.entity.entity_type.as_str(),
                link.confidence,
            ],
        )?;
        Ok(())
    }

    fn delete_cascade_inner(conn: &Connection, id: &DocumentId) -> StoreResult<bool> {
        // Decrement entity occurrences by this document's containment count.
        conn.execute(
            r#"
            UPDATE entities SET occurrences = occurrences - (
                SELECT COUNT(*) FROM chunk_entities ce
                JOIN chunks c ON c.id = ce.chunk_id
                WHERE c.document_id = ?1
                  AND ce.normalized = entities.normalized
                  AND ce.entity_type = entities.entity_type
            )
            WHERE EXISTS (
                SELECT 1 FROM chunk_entities ce
                JOIN chunks c ON c.id = ce.chunk_id
                WHERE c.document_id = ?1
                  AND ce.normalized = entities.normalized
                  AND ce.entity_type = entities.entity_type
            )
            "#,
            params![id.as_str()],
        )?;

        // Entities without remaining evidence go, along with their edges.
        conn.execute(
            r#"
            DELETE FROM related_to WHERE EXISTS (
                SELECT 1 FROM entities e
                WHERE e.occurrences <= 0
                  AND ((e.normalized = related_to.a_normalized AND e.entity_type = related_to.a_type)
                    OR (e.normalized = related_to.b_normalized AND e.entity_type = related_to.b_type))
            )
            "#,
            [],
        )?;
        conn.execute("DELETE FROM entities WHERE occurrences <= 0", [])?;

        conn.execute(
            "DELETE FROM chunks_fts WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)",
            params![id.as_str()],
        )?;

        #[cfg(feature = "embeddings")]
        conn.execute(
            "DELETE FROM chunk_vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)",
            params![id.as_str()],
        )?;

        // FK cascade removes chunks' next_chunk and chunk_entities rows.
        conn.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![id.as_str()],
        )?;
        let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    /// Append filter joins/predicates to a chunk query. The base query
    /// must alias chunks as `c` and already contain a WHERE clause.
    fn filter_sql(filter: &SearchFilter, sql: &mut String, args: &mut Vec<Box<dyn rusqlite::ToSql>>) {
        if let Some(ref division) = filter.division {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM documents d WHERE d.id = c.document_id AND d.division = ?)",
            );
            args.push(Box::new(division.clone()));
        }
        if let Some(ref category) = filter.category {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM documents d WHERE d.id = c.document_id AND d.category = ?)",
            );
            args.push(Box::new(category.clone()));
        }
        if let Some(ref product) = filter.product {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM chunk_entities pe WHERE pe.chunk_id = c.id \
                 AND pe.entity_type = 'PRODUCT' AND pe.normalized = ?)",
            );
            args.push(Box::new(product.clone()));
        }
    }

    fn query_chunks(
        conn: &Connection,
        sql: &str,
        args: &[Box<dyn rusqlite::ToSql>],
    ) -> StoreResult<Vec<Chunk>> {
        let mut stmt = conn.prepare(sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), Self::row_to_chunk)?;
        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    /// Escape a term for an FTS5 MATCH expression.
    fn fts_quote(term: &str) -> String {
        format!("\"{}\"", term.replace('"', "\"\""))
    }
}

impl GraphStore for SqliteStore {
    // === Documents ===

    fn upsert_document(&self, doc: &Document) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_document(&conn, doc)
    }

    fn load_document(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id.as_str()],
                Self::row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    fn list_documents(&self) -> StoreResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM documents ORDER BY id")?;
        let rows = stmt.query_map([], Self::row_to_document)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    fn set_document_status(&self, id: &DocumentId, status: DocumentStatus) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE documents SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(StoreError::DocumentNotFound(id.as_str().to_string()));
        }
        Ok(())
    }

    fn delete_document_cascade(&self, id: &DocumentId) -> StoreResult<bool> {
        let mut guard = self.conn.lock().unwrap();
        let tx = guard.transaction()?;
        let existed = Self::delete_cascade_inner(&tx, id)?;
        tx.commit()?;
        Ok(existed)
    }

    // === Chunks ===

    fn upsert_chunk(&self, chunk: &Chunk) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_chunk(&conn, chunk, self.dimensions)
    }

    fn load_chunk(&self, id: &ChunkId) -> StoreResult<Option<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let chunk = conn
            .query_row(
                &format!("SELECT {} FROM chunks WHERE id = ?1", Self::CHUNK_COLS),
                params![id.as_str()],
                Self::row_to_chunk,
            )
            .optional()?;
        Ok(chunk)
    }

    fn chunks_for_document(&self, id: &DocumentId) -> StoreResult<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        Self::query_chunks(
            &conn,
            &format!(
                "SELECT {} FROM chunks WHERE document_id = ?1 ORDER BY chunk_index",
                Self::CHUNK_COLS
            ),
            &[Box::new(id.as_str().to_string())],
        )
    }

    fn link_next_chunk(&self, from: &ChunkId, to: &ChunkId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO next_chunk (from_id, to_id) VALUES (?1, ?2)
            ON CONFLICT(from_id) DO UPDATE SET to_id = excluded.to_id
            "#,
            params![from.as_str(), to.as_str()],
        )?;
        Ok(())
    }

    fn next_chunks(&self, document_id: &DocumentId) -> StoreResult<Vec<NextChunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT n.from_id, n.to_id FROM next_chunk n
            JOIN chunks c ON c.id = n.from_id
            WHERE c.document_id = ?1
            ORDER BY c.chunk_index
            "#,
        )?;
        let rows = stmt.query_map(params![document_id.as_str()], |row| {
            Ok(NextChunk {
                from: ChunkId::from_string(row.get::<_, String>(0)?),
                to: ChunkId::from_string(row.get::<_, String>(1)?),
            })
        })?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    fn expand_context(&self, id: &ChunkId, hops: u32) -> StoreResult<Vec<Chunk>> {
        let hops = hops.min(2);
        let conn = self.conn.lock().unwrap();
        let mut neighbor_ids: Vec<String> = Vec::new();

        // Walk forwards and backwards along NEXT_CHUNK.
        let mut cursor = id.as_str().to_string();
        for _ in 0..hops {
            let next: Option<String> = conn
                .query_row(
                    "SELECT to_id FROM next_chunk WHERE from_id = ?1",
                    params![cursor],
                    |row| row.get(0),
                )
                .optional()?;
            match next {
                Some(n) => {
                    neighbor_ids.push(n.clone());
                    cursor = n;
                }
                None => break,
            }
        }
        let mut cursor = id.as_str().to_string();
        for _ in 0..hops {
            let prev: Option<String> = conn
                .query_row(
                    "SELECT from_id FROM next_chunk WHERE to_id = ?1",
                    params![cursor],
                    |row| row.get(0),
                )
                .optional()?;
            match prev {
                Some(p) => {
                    neighbor_ids.push(p.clone());
                    cursor = p;
                }
                None => break,
            }
        }

        let mut chunks = Vec::new();
        for nid in neighbor_ids {
            let chunk = conn
                .query_row(
                    &format!("SELECT {} FROM chunks WHERE id = ?1", Self::CHUNK_COLS),
                    params![nid],
                    Self::row_to_chunk,
                )
                .optional()?;
            if let Some(c) = chunk {
                chunks.push(c);
            }
        }
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    // === Entities ===

    fn upsert_entity(&self, surface: &str, key: &EntityKey) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_entity(&conn, surface, key)
    }

    fn link_contains_entity(&self, link: &ContainsEntity) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        Self::write_contains(&conn, link)
    }

    fn entity_lookup(&self, key: &EntityKey) -> StoreResult<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        let entity = conn
            .query_row(
                &format!(
                    "SELECT {} FROM entities WHERE normalized = ?1 AND entity_type = ?2",
                    Self::ENTITY_COLS
                ),
                params![key.normalized, key.entity_type.as_str()],
                Self::row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    fn all_entities(&self) -> StoreResult<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entities ORDER BY normalized, entity_type",
            Self::ENTITY_COLS
        ))?;
        let rows = stmt.query_map([], Self::row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    fn chunks_containing(
        &self,
        key: &EntityKey,
        filter: &SearchFilter,
    ) -> StoreResult<Vec<(Chunk, f32)>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT {}, ce.confidence FROM chunks c \
             JOIN chunk_entities ce ON ce.chunk_id = c.id \
             WHERE ce.normalized = ? AND ce.entity_type = ?",
            Self::CHUNK_COLS_Q
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(key.normalized.clone()),
            Box::new(key.entity_type.as_str().to_string()),
        ];
        Self::filter_sql(filter, &mut sql, &mut args);

        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), |row| {
            let chunk = Self::row_to_chunk(row)?;
            let confidence: f32 = row.get("confidence")?;
            Ok((chunk, confidence))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn mentions_for_chunk(&self, id: &ChunkId) -> StoreResult<Vec<ContainsEntity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT normalized, entity_type, confidence FROM chunk_entities \
             WHERE chunk_id = ?1 ORDER BY normalized, entity_type",
        )?;
        let rows = stmt.query_map(params![id.as_str()], |row| {
            let entity_type: String = row.get(1)?;
            Ok(ContainsEntity {
                chunk_id: id.clone(),
                entity: EntityKey::new(
                    row.get::<_, String>(0)?,
                    EntityType::parse(&entity_type).unwrap_or(EntityType::Other),
                ),
                confidence: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn chunk_entity_memberships(&self) -> StoreResult<Vec<(ChunkId, EntityKey)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT chunk_id, normalized, entity_type FROM chunk_entities")?;
        let rows = stmt.query_map([], |row| {
            let entity_type: String = row.get(2)?;
            Ok((
                ChunkId::from_string(row.get::<_, String>(0)?),
                EntityKey::new(
                    row.get::<_, String>(1)?,
                    EntityType::parse(&entity_type).unwrap_or(EntityType::Other),
                ),
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn update_entity_metrics(&self, key: &EntityKey, metrics: &EntityMetrics) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE entities SET
                community_id = ?1,
                degree_centrality = ?2,
                betweenness_centrality = ?3,
                is_bridge = ?4,
                connected_communities = ?5
            WHERE normalized = ?6 AND entity_type = ?7
            "#,
            params![
                metrics.community_id,
                metrics.degree_centrality,
                metrics.betweenness_centrality,
                metrics.is_bridge,
                metrics.connected_communities,
                key.normalized,
                key.entity_type.as_str(),
            ],
        )?;
        Ok(())
    }

    fn restore_entity(&self, entity: &Entity) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO entities (normalized, entity_type, surface, first_seen, occurrences,
                                  community_id, degree_centrality, betweenness_centrality,
                                  is_bridge, connected_communities)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(normalized, entity_type) DO UPDATE SET
                surface = excluded.surface,
                first_seen = excluded.first_seen,
                occurrences = excluded.occurrences,
                community_id = excluded.community_id,
                degree_centrality = excluded.degree_centrality,
                betweenness_centrality = excluded.betweenness_centrality,
                is_bridge = excluded.is_bridge,
                connected_communities = excluded.connected_communities
            "#,
            params![
                entity.key.normalized,
                entity.key.entity_type.as_str(),
                entity.surface,
                entity.first_seen.to_rfc3339(),
                entity.occurrences,
                entity.community_id,
                entity.degree_centrality,
                entity.betweenness_centrality,
                entity.is_bridge,
                entity.connected_communities,
            ],
        )?;
        Ok(())
    }

    // === Co-occurrence edges ===

    fn replace_related_edges(&self, edges: &[RelatedTo]) -> StoreResult<()> {
        let mut guard = self.conn.lock().unwrap();
        let tx = guard.transaction()?;
        tx.execute("DELETE FROM related_to", [])?;
        for edge in edges {
            if edge.strength < 2 {
                return Err(StoreError::Invariant(format!(
                    "RELATED_TO strength below 2: {} -- {}",
                    edge.pair.first(),
                    edge.pair.second()
                )));
            }
            tx.execute(
                "INSERT INTO related_to (a_normalized, a_type, b_normalized, b_type, strength) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    edge.pair.first().normalized,
                    edge.pair.first().entity_type.as_str(),
                    edge.pair.second().normalized,
                    edge.pair.second().entity_type.as_str(),
                    edge.strength,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn related_edges(&self) -> StoreResult<Vec<RelatedTo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a_normalized, a_type, b_normalized, b_type, strength FROM related_to \
             ORDER BY a_normalized, a_type, b_normalized, b_type",
        )?;
        let rows = stmt.query_map([], |row| {
            let a_type: String = row.get(1)?;
            let b_type: String = row.get(3)?;
            Ok((
                EntityKey::new(
                    row.get::<_, String>(0)?,
                    EntityType::parse(&a_type).unwrap_or(EntityType::Other),
                ),
                EntityKey::new(
                    row.get::<_, String>(2)?,
                    EntityType::parse(&b_type).unwrap_or(EntityType::Other),
                ),
                row.get::<_, u32>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (a, b, strength) = row?;
            if let Some(pair) = EntityPair::new(a, b) {
                out.push(RelatedTo { pair, strength });
            }
        }
        Ok(out)
    }

    // === Atomic document write ===

    fn commit_document(&self, write: &DocumentWrite) -> StoreResult<()> {
        let mut guard = self.conn.lock().unwrap();
        let tx = guard.transaction()?;

        let mut doc = write.document.clone();
        doc.chunk_count = write.chunks.len() as u32;
        doc.status = DocumentStatus::Ingested;
        doc.ingested_at = Some(Utc::now());
        Self::write_document(&tx, &doc)?;

        let mut previous: Option<ChunkId> = None;
        for (chunk, mentions) in &write.chunks {
            if chunk.document_id != doc.id {
                return Err(StoreError::Invariant(format!(
                    "chunk {} does not belong to document {}",
                    chunk.id, doc.id
                )));
            }
            Self::write_chunk(&tx, chunk, self.dimensions)?;

            if let Some(prev) = previous {
                tx.execute(
                    "INSERT INTO next_chunk (from_id, to_id) VALUES (?1, ?2) \
                     ON CONFLICT(from_id) DO UPDATE SET to_id = excluded.to_id",
                    params![prev.as_str(), chunk.id.as_str()],
                )?;
            }
            previous = Some(chunk.id.clone());

            for mention in mentions {
                Self::write_entity(&tx, &mention.surface, &mention.key)?;
                Self::write_contains(
                    &tx,
                    &ContainsEntity {
                        chunk_id: chunk.id.clone(),
                        entity: mention.key.clone(),
                        confidence: mention.confidence,
                    },
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    // === Retrieval primitives ===

    fn keyword_search_chunks(
        &self,
        terms: &[String],
        filter: &SearchFilter,
        limit: usize,
    ) -> StoreResult<Vec<Chunk>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let match_expr = terms
            .iter()
            .map(|t| Self::fts_quote(t))
            .collect::<Vec<_>>()
            .join(" OR ");

        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT {} FROM chunks c WHERE c.id IN \
             (SELECT chunk_id FROM chunks_fts WHERE chunks_fts MATCH ?)",
            Self::CHUNK_COLS_Q
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(match_expr)];
        Self::filter_sql(filter, &mut sql, &mut args);
        sql.push_str(&format!(" ORDER BY c.document_id, c.chunk_index LIMIT {limit}"));

        Self::query_chunks(&conn, &sql, &args)
    }

    fn vector_search_chunks(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> StoreResult<Vec<(Chunk, f32)>> {
        if query.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        #[cfg(feature = "embeddings")]
        {
            let conn = self.conn.lock().unwrap();
            // Over-fetch so post-filtering still fills k.
            let hits = crate::store::vector::knn(&conn, query, k * 4)?;
            drop(conn);
            let mut out = Vec::new();
            for (chunk_id, similarity) in hits {
                if let Some(chunk) = self.load_chunk(&ChunkId::from_string(chunk_id))? {
                    if chunk_passes_filter(self, &chunk, filter)? {
                        out.push((chunk, similarity.clamp(0.0, 1.0)));
                    }
                }
                if out.len() >= k {
                    break;
                }
            }
            return Ok(out);
        }

        #[cfg(not(feature = "embeddings"))]
        {
            // Linear scan over embedding blobs. Fine at test scale; the
            // embeddings feature provides the ANN path.
            let conn = self.conn.lock().unwrap();
            let mut sql = format!(
                "SELECT {} FROM chunks c WHERE c.embedding IS NOT NULL",
                Self::CHUNK_COLS_Q
            );
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            Self::filter_sql(filter, &mut sql, &mut args);

            let chunks = Self::query_chunks(&conn, &sql, &args)?;
            let mut scored: Vec<(Chunk, f32)> = chunks
                .into_iter()
                .map(|c| {
                    let sim = dot(query, &c.embedding).clamp(0.0, 1.0);
                    (c, sim)
                })
                .collect();
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });
            scored.truncate(k);
            Ok(scored)
        }
    }

    fn chunks_in_communities(
        &self,
        communities: &[i64],
        filter: &SearchFilter,
        limit: usize,
    ) -> StoreResult<Vec<Chunk>> {
        if communities.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = communities.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let mut sql = format!(
            "SELECT DISTINCT {} FROM chunks c \
             JOIN chunk_entities ce ON ce.chunk_id = c.id \
             JOIN entities e ON e.normalized = ce.normalized AND e.entity_type = ce.entity_type \
             WHERE e.community_id IN ({placeholders})",
            Self::CHUNK_COLS_Q
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = communities
            .iter()
            .map(|c| Box::new(*c) as Box<dyn rusqlite::ToSql>)
            .collect();
        Self::filter_sql(filter, &mut sql, &mut args);
        sql.push_str(&format!(" ORDER BY c.document_id, c.chunk_index LIMIT {limit}"));

        Self::query_chunks(&conn, &sql, &args)
    }

    fn bridge_chunks(
        &self,
        communities: &[i64],
        filter: &SearchFilter,
        limit: usize,
    ) -> StoreResult<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT DISTINCT {} FROM chunks c \
             JOIN chunk_entities ce ON ce.chunk_id = c.id \
             JOIN entities e ON e.normalized = ce.normalized AND e.entity_type = ce.entity_type \
             WHERE e.is_bridge = 1",
            Self::CHUNK_COLS_Q
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if !communities.is_empty() {
            let placeholders = communities.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND e.community_id IN ({placeholders})"));
            for c in communities {
                args.push(Box::new(*c));
            }
        }
        Self::filter_sql(filter, &mut sql, &mut args);
        sql.push_str(&format!(" ORDER BY c.document_id, c.chunk_index LIMIT {limit}"));

        Self::query_chunks(&conn, &sql, &args)
    }

    // === Admin ===

    fn schema_summary(&self) -> StoreResult<SchemaSummary> {
        let conn = self.conn.lock().unwrap();
        let count = |sql: &str| -> StoreResult<u64> {
            Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as u64)
        };

        let mut labels = HashMap::new();
        labels.insert("Document".to_string(), count("SELECT COUNT(*) FROM documents")?);
        labels.insert("Chunk".to_string(), count("SELECT COUNT(*) FROM chunks")?);
        labels.insert("Entity".to_string(), count("SELECT COUNT(*) FROM entities")?);
        labels.insert(
            "Community".to_string(),
            count("SELECT COUNT(DISTINCT community_id) FROM entities WHERE community_id IS NOT NULL")?,
        );

        let mut relationships = HashMap::new();
        relationships.insert("HAS_CHUNK".to_string(), count("SELECT COUNT(*) FROM chunks")?);
        relationships.insert(
            "NEXT_CHUNK".to_string(),
            count("SELECT COUNT(*) FROM next_chunk")?,
        );
        relationships.insert(
            "CONTAINS_ENTITY".to_string(),
            count("SELECT COUNT(*) FROM chunk_entities")?,
        );
        relationships.insert(
            "RELATED_TO".to_string(),
            count("SELECT COUNT(*) FROM related_to")?,
        );

        let mut indexes = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            indexes.push(row?);
        }
        indexes.push("chunks_fts (full-text)".to_string());
        #[cfg(feature = "embeddings")]
        indexes.push("chunk_vectors (ann, cosine)".to_string());

        Ok(SchemaSummary {
            labels,
            relationships,
            indexes,
            constraints: vec![
                "documents.id unique".to_string(),
                "entities.(normalized, entity_type) unique".to_string(),
                "chunks.document_id references documents.id".to_string(),
            ],
        })
    }

    fn raw_read(&self, sql: &str) -> StoreResult<Vec<serde_json::Value>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt.query_map([], |row| {
            let mut obj = serde_json::Map::new();
            for (i, name) in names.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => serde_json::Value::from(v),
                    rusqlite::types::ValueRef::Real(v) => serde_json::Value::from(v),
                    rusqlite::types::ValueRef::Text(t) => {
                        serde_json::Value::from(String::from_utf8_lossy(t).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(b) => {
                        serde_json::Value::from(format!("<blob {} bytes>", b.len()))
                    }
                };
                obj.insert(name.clone(), value);
            }
            Ok(serde_json::Value::Object(obj))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn raw_execute(&self, sql: &str) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(sql, [])?)
    }
}

/// Re-check the store filter against a loaded chunk (ANN path only, where
/// filtering happens after the index lookup).
#[cfg(feature = "embeddings")]
fn chunk_passes_filter(
    store: &SqliteStore,
    chunk: &Chunk,
    filter: &SearchFilter,
) -> StoreResult<bool> {
    if filter.is_empty() {
        return Ok(true);
    }
    if filter.division.is_some() || filter.category.is_some() {
        let doc = store.load_document(&chunk.document_id)?;
        let Some(doc) = doc else { return Ok(false) };
        if let Some(ref division) = filter.division {
            if doc.division.as_deref() != Some(division.as_str()) {
                return Ok(false);
            }
        }
        if let Some(ref category) = filter.category {
            if doc.category.as_deref() != Some(category.as_str()) {
                return Ok(false);
            }
        }
    }
    if let Some(ref product) = filter.product {
        let mentions = store.mentions_for_chunk(&chunk.id)?;
        let found = mentions.iter().any(|m| {
            m.entity.entity_type == EntityType::Product && m.entity.normalized == *product
        });
        if !found {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::vector::l2_normalize;

    const DIM: usize = 4;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(DIM).unwrap()
    }

    fn unit(v: [f32; DIM]) -> Vec<f32> {
        let mut v = v.to_vec();
        l2_normalize(&mut v);
        v
    }

    fn chunk(doc: &DocumentId, index: u32, page: u32, text: &str, emb: [f32; DIM]) -> Chunk {
        Chunk {
            id: ChunkId::new(doc, index),
            document_id: doc.clone(),
            text: text.to_string(),
            page_num: page,
            chunk_index: index,
            token_count: text.split_whitespace().count() as u32,
            embedding: unit(emb),
            semantic_density: 0.5,
            chunk_type: ChunkType::Content,
            has_definitions: false,
            has_examples: false,
            keywords: Vec::new(),
        }
    }

    fn mention(normalized: &str, t: EntityType, confidence: f32) -> super::super::EntityMention {
        super::super::EntityMention {
            surface: normalized.to_string(),
            key: EntityKey::new(normalized, t),
            confidence,
        }
    }

    fn write_two_chunk_doc(store: &SqliteStore, filename: &str) -> DocumentId {
        let doc = Document::new(filename, 2);
        let id = doc.id.clone();
        let write = DocumentWrite {
            document: doc,
            chunks: vec![
                (
                    chunk(&id, 0, 1, "An FX Forward locks in an exchange rate.", [1.0, 0.0, 0.0, 0.0]),
                    vec![mention("fx_forward", EntityType::Product, 0.85)],
                ),
                (
                    chunk(&id, 1, 2, "The premium is payable up front.", [0.0, 1.0, 0.0, 0.0]),
                    vec![
                        mention("fx_forward", EntityType::Product, 0.85),
                        mention("premium", EntityType::Term, 0.85),
                    ],
                ),
            ],
        };
        store.commit_document(&write).unwrap();
        id
    }

    #[test]
    fn commit_writes_document_chunks_and_links() {
        let store = store();
        let id = write_two_chunk_doc(&store, "guide.pdf");

        let doc = store.load_document(&id).unwrap().unwrap();
        assert_eq!(doc.chunk_count, 2);
        assert_eq!(doc.status, DocumentStatus::Ingested);

        let chunks = store.chunks_for_document(&id).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);

        let links = store.next_chunks(&id).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].from, chunks[0].id);
        assert_eq!(links[0].to, chunks[1].id);
    }

    #[test]
    fn entity_occurrences_count_containing_chunks() {
        let store = store();
        write_two_chunk_doc(&store, "guide.pdf");

        let fx = store
            .entity_lookup(&EntityKey::new("fx_forward", EntityType::Product))
            .unwrap()
            .unwrap();
        assert_eq!(fx.occurrences, 2);

        let premium = store
            .entity_lookup(&EntityKey::new("premium", EntityType::Term))
            .unwrap()
            .unwrap();
        assert_eq!(premium.occurrences, 1);
    }

    #[test]
    fn cascade_delete_leaves_no_residue_and_decrements_entities() {
        let store = store();
        let a = write_two_chunk_doc(&store, "a.pdf");
        let b = write_two_chunk_doc(&store, "b.pdf");

        // fx_forward now has 4 occurrences across both documents.
        let fx = store
            .entity_lookup(&EntityKey::new("fx_forward", EntityType::Product))
            .unwrap()
            .unwrap();
        assert_eq!(fx.occurrences, 4);

        assert!(store.delete_document_cascade(&a).unwrap());

        assert!(store.load_document(&a).unwrap().is_none());
        assert!(store.chunks_for_document(&a).unwrap().is_empty());
        assert!(store.next_chunks(&a).unwrap().is_empty());

        // Shared entity survives with decremented count.
        let fx = store
            .entity_lookup(&EntityKey::new("fx_forward", EntityType::Product))
            .unwrap()
            .unwrap();
        assert_eq!(fx.occurrences, 2);

        // Document b is untouched.
        assert_eq!(store.chunks_for_document(&b).unwrap().len(), 2);
    }

    #[test]
    fn cascade_delete_removes_orphaned_entities() {
        let store = store();
        let a = write_two_chunk_doc(&store, "only.pdf");
        store.delete_document_cascade(&a).unwrap();

        assert!(store
            .entity_lookup(&EntityKey::new("premium", EntityType::Term))
            .unwrap()
            .is_none());
        assert!(store
            .entity_lookup(&EntityKey::new("fx_forward", EntityType::Product))
            .unwrap()
            .is_none());
    }

    #[test]
    fn keyword_search_matches_fts() {
        let store = store();
        write_two_chunk_doc(&store, "guide.pdf");

        let hits = store
            .keyword_search_chunks(
                &["premium".to_string()],
                &SearchFilter::default(),
                10,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("premium"));

        // OR semantics: either term matches.
        let hits = store
            .keyword_search_chunks(
                &["premium".to_string(), "forward".to_string()],
                &SearchFilter::default(),
                10,
            )
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn vector_search_orders_by_similarity() {
        let store = store();
        let id = write_two_chunk_doc(&store, "guide.pdf");

        let query = unit([1.0, 0.1, 0.0, 0.0]);
        let hits = store
            .vector_search_chunks(&query, 2, &SearchFilter::default())
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, ChunkId::new(&id, 0));
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn vector_search_rejects_wrong_dimension() {
        let store = store();
        let err = store
            .vector_search_chunks(&[1.0, 0.0], 5, &SearchFilter::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn division_filter_pushed_down() {
        let store = store();
        let doc = Document::new("wib.pdf", 1).with_division("institutional");
        let id = doc.id.clone();
        store
            .commit_document(&DocumentWrite {
                document: doc,
                chunks: vec![(
                    chunk(&id, 0, 1, "swap pricing table", [1.0, 0.0, 0.0, 0.0]),
                    vec![],
                )],
            })
            .unwrap();
        write_two_chunk_doc(&store, "retail.pdf");

        let filter = SearchFilter::default().with_division("institutional");
        let hits = store
            .keyword_search_chunks(&["swap".to_string(), "premium".to_string()], &filter, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, id);
    }

    #[test]
    fn product_filter_requires_containing_entity() {
        let store = store();
        write_two_chunk_doc(&store, "guide.pdf");

        let filter = SearchFilter::default().with_product("fx_forward");
        let hits = store
            .keyword_search_chunks(&["premium".to_string()], &filter, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);

        let filter = SearchFilter::default().with_product("interest_rate_swap");
        let hits = store
            .keyword_search_chunks(&["premium".to_string()], &filter, 10)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn related_edges_round_trip_and_reject_weak() {
        let store = store();
        write_two_chunk_doc(&store, "guide.pdf");

        let pair = EntityPair::new(
            EntityKey::new("fx_forward", EntityType::Product),
            EntityKey::new("premium", EntityType::Term),
        )
        .unwrap();

        store
            .replace_related_edges(&[RelatedTo { pair: pair.clone(), strength: 3 }])
            .unwrap();
        let edges = store.related_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].strength, 3);

        let err = store
            .replace_related_edges(&[RelatedTo { pair, strength: 1 }])
            .unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[test]
    fn expand_context_walks_both_directions() {
        let store = store();
        let doc = Document::new("long.pdf", 1);
        let id = doc.id.clone();
        let chunks: Vec<_> = (0..4)
            .map(|i| {
                (
                    chunk(&id, i, 1, &format!("section {i}"), [1.0, 0.0, 0.0, 0.0]),
                    vec![],
                )
            })
            .collect();
        store
            .commit_document(&DocumentWrite { document: doc, chunks })
            .unwrap();

        let around = store.expand_context(&ChunkId::new(&id, 1), 2).unwrap();
        let indices: Vec<u32> = around.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
    }

    #[test]
    fn schema_summary_counts() {
        let store = store();
        write_two_chunk_doc(&store, "guide.pdf");

        let summary = store.schema_summary().unwrap();
        assert_eq!(summary.labels["Document"], 1);
        assert_eq!(summary.labels["Chunk"], 2);
        assert_eq!(summary.labels["Entity"], 2);
        assert_eq!(summary.relationships["HAS_CHUNK"], 2);
        assert_eq!(summary.relationships["NEXT_CHUNK"], 1);
        assert_eq!(summary.relationships["CONTAINS_ENTITY"], 3);
        assert!(!summary.indexes.is_empty());
    }

    #[test]
    fn update_entity_metrics_persists() {
        let store = store();
        write_two_chunk_doc(&store, "guide.pdf");

        let key = EntityKey::new("fx_forward", EntityType::Product);
        store
            .update_entity_metrics(
                &key,
                &EntityMetrics {
                    community_id: Some(2),
                    degree_centrality: 0.5,
                    betweenness_centrality: 0.25,
                    is_bridge: true,
                    connected_communities: 3,
                },
            )
            .unwrap();

        let entity = store.entity_lookup(&key).unwrap().unwrap();
        assert_eq!(entity.community_id, Some(2));
        assert!(entity.is_bridge);
        assert_eq!(entity.connected_communities, 3);
    }

    #[test]
    fn raw_read_returns_json_rows() {
        let store = store();
        write_two_chunk_doc(&store, "guide.pdf");

        let rows = store
            .raw_read("SELECT id, total_pages FROM documents")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "guide");
        assert_eq!(rows[0]["total_pages"], 2);
    }
}
