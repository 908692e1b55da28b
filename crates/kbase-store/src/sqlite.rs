//! SQLite store with FTS5 keyword search and quantized vector search.
//!
//! Reference implementation of the `VectorSearch` and `KeywordSearch`
//! collaborators. Tenant and document filters are applied in SQL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use kbase_core::scoring::{cosine_similarity, sort_by_score_desc};
use kbase_core::{
    Error, KeywordSearch, Metadata, Result, ScoredChunk, SearchFilters, TenantScope, VectorSearch,
};

use crate::quantize::QuantizedVector;
use crate::schema::{FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, SCHEMA_SQL};
use crate::types::{ChunkInput, DocumentInput, DocumentRecord, StoreStats};

/// Placeholder relevance for substring-fallback keyword hits.
pub const FALLBACK_KEYWORD_SCORE: f64 = 0.5;

const CHUNK_COLUMNS: &str =
    "c.id, c.document_id, c.content, c.chunk_index, c.start_index, c.end_index, c.metadata_json";

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    embedding_dim: usize,
}

impl SqliteStore {
    /// Open or create the store at `db_dir/kbase.db`.
    pub fn open(db_dir: impl AsRef<Path>, embedding_dim: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)?;
        let db_path = db_dir.join("kbase.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            embedding_dim,
        };

        let stats = store.stats()?;
        info!(
            "SqliteStore initialized: {} documents, {} chunks, dim={}, path={}",
            stats.documents,
            stats.chunks,
            embedding_dim,
            store.db_path.display()
        );
        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}\n{}", SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    pub fn get_document(&self, scope: &TenantScope, id: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, organisation_id, title, content_hash, metadata_json, chunk_count, created_at, updated_at \
                 FROM documents WHERE organisation_id = ?1 AND id = ?2",
            )
            .map_err(db_err)?;
        let record = stmt.query_row(params![scope.organisation_id, id], |row| {
            let metadata: Option<String> = row.get(4)?;
            Ok(DocumentRecord {
                id: row.get(0)?,
                organisation_id: row.get(1)?,
                title: row.get(2)?,
                content_hash: row.get(3)?,
                metadata: metadata
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default(),
                chunk_count: row.get::<_, i64>(5)? as usize,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })
        .optional()
        .map_err(db_err)?;
        Ok(record)
    }

    /// Replace a document and all of its chunks in one transaction.
    ///
    /// Old chunks (and their embeddings and FTS rows) are deleted before the
    /// new set is inserted. Nothing is written if any embedding has the
    /// wrong dimension.
    pub fn replace_document(&self, doc: &DocumentInput, chunks: &[ChunkInput]) -> Result<DocumentRecord> {
        for c in chunks {
            if c.embedding.len() != self.embedding_dim {
                return Err(Error::DimensionMismatch {
                    left: c.embedding.len(),
                    right: self.embedding_dim,
                });
            }
        }

        let now = now_millis();
        let doc_meta = serde_json::to_string(&doc.metadata)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let removed = tx
            .execute(
                "DELETE FROM chunks WHERE organisation_id = ?1 AND document_id = ?2",
                params![doc.organisation_id, doc.id],
            )
            .map_err(db_err)?;

        tx.execute(
            "INSERT INTO documents (organisation_id, id, title, content_hash, metadata_json, chunk_count, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
             ON CONFLICT(organisation_id, id) DO UPDATE SET \
                 title = excluded.title, \
                 content_hash = excluded.content_hash, \
                 metadata_json = excluded.metadata_json, \
                 chunk_count = excluded.chunk_count, \
                 updated_at = excluded.updated_at",
            params![
                doc.organisation_id,
                doc.id,
                doc.title,
                doc.content_hash,
                doc_meta,
                chunks.len() as i64,
                now
            ],
        )
        .map_err(db_err)?;

        {
            let mut insert_chunk = tx
                .prepare_cached(
                    "INSERT INTO chunks (id, organisation_id, document_id, content, chunk_index, start_index, end_index, metadata_json, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(db_err)?;
            let mut insert_embedding = tx
                .prepare_cached(
                    "INSERT INTO chunk_embeddings (chunk_seq, embedding, scale, offset_val) VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_err)?;

            for (index, input) in chunks.iter().enumerate() {
                let meta = input
                    .chunk
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                let seq = insert_chunk
                    .insert(params![
                        uuid::Uuid::new_v4().to_string(),
                        doc.organisation_id,
                        doc.id,
                        input.chunk.content,
                        index as i64,
                        input.chunk.start_index as i64,
                        input.chunk.end_index as i64,
                        meta,
                        now
                    ])
                    .map_err(db_err)?;

                let q = QuantizedVector::quantize(&input.embedding);
                insert_embedding
                    .execute(params![seq, q.bytes, q.scale as f64, q.offset as f64])
                    .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        drop(conn);

        debug!(
            document = %doc.id,
            removed,
            inserted = chunks.len(),
            "replaced document chunks"
        );

        self.get_document(&TenantScope::new(doc.organisation_id.clone()), &doc.id)?
            .ok_or_else(|| Error::Internal(format!("document {} vanished after write", doc.id)))
    }

    /// Delete a document and its chunks. Returns whether it existed.
    pub fn delete_document(&self, scope: &TenantScope, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM chunks WHERE organisation_id = ?1 AND document_id = ?2",
            params![scope.organisation_id, id],
        )
        .map_err(db_err)?;
        let deleted = tx
            .execute(
                "DELETE FROM documents WHERE organisation_id = ?1 AND id = ?2",
                params![scope.organisation_id, id],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(deleted > 0)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<usize> {
            conn.query_row(sql, [], |r| r.get::<_, i64>(0))
                .map(|n| n as usize)
                .map_err(db_err)
        };
        Ok(StoreStats {
            documents: count("SELECT COUNT(*) FROM documents")?,
            chunks: count("SELECT COUNT(*) FROM chunks")?,
            embeddings: count("SELECT COUNT(*) FROM chunk_embeddings")?,
        })
    }

    pub fn count_chunks(&self, scope: &TenantScope) -> Result<usize> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE organisation_id = ?1",
            params![scope.organisation_id],
            |r| r.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------

    /// Brute-force cosine search over the tenant's embeddings.
    pub fn search_vectors(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        if query_embedding.len() != self.embedding_dim {
            return Err(Error::DimensionMismatch {
                left: query_embedding.len(),
                right: self.embedding_dim,
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, e.embedding, e.scale, e.offset_val \
             FROM chunk_embeddings e JOIN chunks c ON c.seq = e.chunk_seq \
             WHERE c.organisation_id = ?1{} \
             ORDER BY c.seq",
            document_filter(2, filters.document_ids.len())
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(scope_params(filters)), |row| {
                let stored = QuantizedVector {
                    bytes: row.get(7)?,
                    scale: row.get::<_, f64>(8)? as f32,
                    offset: row.get::<_, f64>(9)? as f32,
                };
                Ok((row_to_chunk(row)?, stored))
            })
            .map_err(db_err)?;

        let mut hits = Vec::new();
        for row in rows {
            let (mut chunk, stored) = row.map_err(db_err)?;
            let score = cosine_similarity(query_embedding, &stored.dequantize().to_vec())?;
            chunk.semantic_score = score;
            chunk.push_score(kbase_core::ScoreStage::Semantic, score);
            hits.push(chunk);
        }

        sort_by_score_desc(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    /// FTS5 bm25 search; falls back to a substring scan when it finds nothing.
    pub fn search_keywords(&self, query: &str, limit: usize, filters: &SearchFilters) -> Result<Vec<ScoredChunk>> {
        let needle = query.trim();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let fts_query = sanitize_fts_query(needle);
        let mut hits = if fts_query.is_empty() {
            Vec::new()
        } else {
            self.fts_search(&fts_query, limit, filters)?
        };

        if hits.is_empty() {
            hits = self.substring_search(needle, limit, filters)?;
            debug!(
                query = needle,
                hits = hits.len(),
                "full-text search empty, used substring fallback"
            );
        }
        Ok(hits)
    }

    fn fts_search(&self, fts_query: &str, limit: usize, filters: &SearchFilters) -> Result<Vec<ScoredChunk>> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, chunks_fts.rank AS bm25_rank \
             FROM chunks_fts JOIN chunks c ON c.seq = chunks_fts.rowid \
             WHERE chunks_fts MATCH ?1 AND c.organisation_id = ?2{} \
             ORDER BY chunks_fts.rank \
             LIMIT {limit}",
            document_filter(3, filters.document_ids.len())
        );
        let mut params = vec![fts_query.to_string()];
        params.extend(scope_params(filters));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                let rank: f64 = row.get(7)?;
                let mut chunk = row_to_chunk(row)?;
                // FTS5 rank is negative; negate for positive
                chunk.keyword_score = -rank;
                chunk.push_score(kbase_core::ScoreStage::Keyword, -rank);
                Ok(chunk)
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }

    fn substring_search(&self, needle: &str, limit: usize, filters: &SearchFilters) -> Result<Vec<ScoredChunk>> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c \
             WHERE c.organisation_id = ?1 AND instr(lower(c.content), lower(?2)) > 0{} \
             ORDER BY c.seq \
             LIMIT {limit}",
            document_filter(3, filters.document_ids.len())
        );
        let mut params = vec![filters.organisation_id().to_string(), needle.to_string()];
        params.extend(filters.document_ids.iter().cloned());

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                let mut chunk = row_to_chunk(row)?;
                chunk.keyword_score = FALLBACK_KEYWORD_SCORE;
                chunk.keyword_fallback = true;
                chunk.push_score(kbase_core::ScoreStage::Keyword, FALLBACK_KEYWORD_SCORE);
                Ok(chunk)
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }
}

/// Quote each whitespace token and OR them together for FTS5 MATCH.
fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// ` AND c.document_id IN (?n, ...)` with placeholders starting at `first`.
fn document_filter(first: usize, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let placeholders: Vec<String> = (first..first + count).map(|i| format!("?{i}")).collect();
    format!(" AND c.document_id IN ({})", placeholders.join(", "))
}

fn scope_params(filters: &SearchFilters) -> Vec<String> {
    std::iter::once(filters.organisation_id().to_string())
        .chain(filters.document_ids.iter().cloned())
        .collect()
}

/// Map the `CHUNK_COLUMNS` prefix of a row to an unscored chunk.
fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<ScoredChunk> {
    let mut metadata: Metadata = row
        .get::<_, Option<String>>(6)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    metadata.insert("chunkIndex".into(), row.get::<_, i64>(3)?.into());
    metadata.insert("startIndex".into(), row.get::<_, i64>(4)?.into());
    metadata.insert("endIndex".into(), row.get::<_, i64>(5)?.into());

    Ok(ScoredChunk::new(
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
    )
    .with_metadata(metadata))
}

#[async_trait]
impl VectorSearch for SqliteStore {
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        self.search_vectors(query_embedding, limit, filters)
    }
}

#[async_trait]
impl KeywordSearch for SqliteStore {
    async fn keyword_search(&self, query: &str, limit: usize, filters: &SearchFilters) -> Result<Vec<ScoredChunk>> {
        self.search_keywords(query, limit, filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbase_core::TextChunk;
    use tempfile::TempDir;

    use crate::types::content_hash;

    const DIM: usize = 4;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path(), DIM).unwrap();
        (store, dir)
    }

    fn doc(org: &str, id: &str, body: &str) -> DocumentInput {
        DocumentInput {
            id: id.into(),
            organisation_id: org.into(),
            title: Some(format!("{id} title")),
            content_hash: content_hash(body),
            metadata: Metadata::new(),
        }
    }

    fn chunk(text: &str, start: usize, embedding: [f32; DIM]) -> ChunkInput {
        ChunkInput {
            chunk: TextChunk {
                content: text.into(),
                start_index: start,
                end_index: start + text.len(),
                metadata: None,
            },
            embedding: embedding.to_vec(),
        }
    }

    fn seed(store: &SqliteStore) {
        store
            .replace_document(
                &doc("org-a", "rust", "rust body"),
                &[
                    chunk("Rust is a systems programming language", 0, [1.0, 0.0, 0.0, 0.0]),
                    chunk("Cargo builds Rust crates and manages dependencies", 40, [0.7, 0.7, 0.0, 0.0]),
                ],
            )
            .unwrap();
        store
            .replace_document(
                &doc("org-a", "cooking", "cooking body"),
                &[chunk("Bread needs flour, water and time", 0, [0.0, 0.0, 1.0, 0.0])],
            )
            .unwrap();
        store
            .replace_document(
                &doc("org-b", "secret", "secret body"),
                &[chunk("Rust internals only org-b may read", 0, [1.0, 0.0, 0.0, 0.0])],
            )
            .unwrap();
    }

    #[test]
    fn test_replace_document_records_counts() {
        let (store, _dir) = test_store();
        seed(&store);

        let scope = TenantScope::new("org-a");
        let record = store.get_document(&scope, "rust").unwrap().unwrap();
        assert_eq!(record.chunk_count, 2);
        assert_eq!(record.content_hash, content_hash("rust body"));
        assert_eq!(store.count_chunks(&scope).unwrap(), 3);
        assert_eq!(store.stats().unwrap().embeddings, 4);
    }

    #[test]
    fn test_resync_replaces_chunks_wholesale() {
        let (store, _dir) = test_store();
        seed(&store);

        store
            .replace_document(
                &doc("org-a", "rust", "rust body v2"),
                &[chunk("Ownership and borrowing explained", 0, [0.0, 1.0, 0.0, 0.0])],
            )
            .unwrap();

        let filters = SearchFilters::for_tenant("org-a").with_documents(vec!["rust".into()]);
        let hits = store.search_keywords("cargo", 10, &filters).unwrap();
        assert!(hits.is_empty(), "old chunk still indexed: {hits:?}");

        let hits = store.search_keywords("ownership", 10, &filters).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.stats().unwrap().chunks, 3);
    }

    #[test]
    fn test_dimension_mismatch_writes_nothing() {
        let (store, _dir) = test_store();
        let bad = ChunkInput {
            chunk: TextChunk {
                content: "x".into(),
                start_index: 0,
                end_index: 1,
                metadata: None,
            },
            embedding: vec![1.0; DIM + 1],
        };
        let err = store.replace_document(&doc("org-a", "d", "x"), &[bad]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(store.stats().unwrap().documents, 0);
    }

    #[test]
    fn test_keyword_search_ranks_and_scopes() {
        let (store, _dir) = test_store();
        seed(&store);

        let hits = store
            .search_keywords("rust", 10, &SearchFilters::for_tenant("org-a"))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.document_id == "rust"));
        assert!(hits.iter().all(|h| h.keyword_score > 0.0 && !h.keyword_fallback));
        assert!(hits.iter().any(|h| h.metadata["startIndex"] == 40));
    }

    #[test]
    fn test_keyword_substring_fallback_is_flagged() {
        let (store, _dir) = test_store();
        seed(&store);

        // "ystems" is not an FTS token, but is a substring.
        let hits = store
            .search_keywords("ystems", 10, &SearchFilters::for_tenant("org-a"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].keyword_fallback);
        assert_eq!(hits[0].keyword_score, FALLBACK_KEYWORD_SCORE);
        assert_eq!(hits[0].current_score(), FALLBACK_KEYWORD_SCORE);
    }

    #[test]
    fn test_vector_search_orders_by_cosine() {
        let (store, _dir) = test_store();
        seed(&store);

        let hits = store
            .search_vectors(&[1.0, 0.0, 0.0, 0.0], 10, &SearchFilters::for_tenant("org-a"))
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].content, "Rust is a systems programming language");
        assert!(hits[0].semantic_score > 0.99);
        assert!(hits[1].semantic_score > hits[2].semantic_score);
        assert!(hits.iter().all(|h| h.document_id != "secret"));
    }

    #[test]
    fn test_vector_search_respects_limit_and_dimension() {
        let (store, _dir) = test_store();
        seed(&store);

        let hits = store
            .search_vectors(&[0.0, 0.0, 1.0, 0.0], 1, &SearchFilters::for_tenant("org-a"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "cooking");

        let err = store
            .search_vectors(&[1.0, 0.0], 5, &SearchFilters::for_tenant("org-a"))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { left: 2, right: DIM }));
    }

    #[test]
    fn test_delete_document_is_scoped() {
        let (store, _dir) = test_store();
        seed(&store);

        assert!(!store.delete_document(&TenantScope::new("org-b"), "rust").unwrap());
        assert!(store.delete_document(&TenantScope::new("org-a"), "rust").unwrap());
        assert!(store.get_document(&TenantScope::new("org-a"), "rust").unwrap().is_none());

        let hits = store
            .search_keywords("rust", 10, &SearchFilters::for_tenant("org-a"))
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.stats().unwrap().embeddings, 2);
    }

    #[tokio::test]
    async fn test_trait_objects_delegate() {
        let (store, _dir) = test_store();
        seed(&store);

        let vector: &dyn VectorSearch = &store;
        let keyword: &dyn KeywordSearch = &store;
        let filters = SearchFilters::for_tenant("org-b");
        assert_eq!(vector.vector_search(&[1.0, 0.0, 0.0, 0.0], 5, &filters).await.unwrap().len(), 1);
        assert_eq!(keyword.keyword_search("internals", 5, &filters).await.unwrap().len(), 1);
    }

    #[test]
    fn test_document_filter_placeholders() {
        assert_eq!(document_filter(2, 0), "");
        assert_eq!(document_filter(3, 2), " AND c.document_id IN (?3, ?4)");
        assert_eq!(sanitize_fts_query("rust \"safe\" code"), "\"rust\" OR \"safe\" OR \"code\"");
    }
}
