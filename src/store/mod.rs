//! File-backed vector store for embedded policy chunks.
//!
//! One SQLite file per named collection under a configured directory.
//! Chunks are stored with their flat metadata and unit-norm embeddings;
//! similarity queries run a metadata-filtered scan with dot-product
//! scoring, which is cosine similarity for unit vectors.
//!
//! The connection is a process-lifetime shared resource behind a mutex.
//! [`VectorStore::rebuild`] is the only writer after startup: it builds a
//! fresh collection file next to the live one and atomically renames it
//! into place while holding the lock, so readers never observe a
//! half-built collection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::debug;

use crate::embedding::{DIMENSIONS, similarity};
use crate::error::{Result, StoreError};
use crate::kb::DocumentChunk;

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "apartment_kb";

/// A chunk paired with its embedding, ready for persistence.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    /// The chunk and its metadata.
    pub chunk: DocumentChunk,
    /// Unit-norm embedding, [`DIMENSIONS`] floats.
    pub embedding: Vec<f32>,
}

/// Metadata filter for similarity queries.
///
/// A building filter always admits chunks scoped `all_buildings` in
/// addition to the requested building. Category narrowing is optional and
/// case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    /// Requested building id, or `None` for no building constraint.
    pub building_id: Option<String>,
    /// Category to narrow by, or `None` for all categories.
    pub category: Option<String>,
}

/// File-backed similarity index with a named collection.
pub struct VectorStore {
    dir: PathBuf,
    collection: String,
    conn: Mutex<Connection>,
}

impl VectorStore {
    /// Opens (or creates) the collection under `dir`. An existing
    /// collection file is attached as-is without reingesting.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(dir: &Path, collection: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Database(e.to_string()))?;
        let conn = Connection::open(collection_path(dir, collection))
            .map_err(StoreError::from)?;
        init_schema(&conn)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            collection: collection.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Inserts or replaces chunks in the live collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DimensionMismatch`] for embeddings of the
    /// wrong length, or a database error on write failure.
    pub fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        insert_chunks(&tx, chunks)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Runs a similarity query against the collection.
    ///
    /// Returns up to `top_k` `(chunk, similarity)` pairs matching the
    /// filter, ordered by descending similarity with `chunk_id` as a
    /// deterministic secondary key. An empty collection yields an empty
    /// list, not an error.
    ///
    /// # Errors
    ///
    /// Returns a database error if the scan fails.
    pub fn query(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let (sql, params) = build_filter_sql(filter);
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let rows = stmt
            .query_map(params_ref.as_slice(), row_to_chunk)
            .map_err(StoreError::from)?;

        let mut scored: Vec<(DocumentChunk, f32)> = Vec::new();
        for row in rows {
            let (chunk, embedding) = row.map_err(StoreError::from)??;
            let score = similarity(query_vector, &embedding);
            scored.push((chunk, score));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Returns the number of chunks in the collection.
    ///
    /// # Errors
    ///
    /// Returns a database error if the count query fails.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        usize::try_from(count).map_err(|e| StoreError::Database(e.to_string()).into())
    }

    /// Atomically replaces the collection with `chunks`.
    ///
    /// A fresh collection file is written beside the live one and renamed
    /// over it. The store's lock is held for the duration, so in-flight
    /// readers drain before the swap and later readers see only the new
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SwapFailed`] when the rename fails; the live
    /// collection is left untouched in that case.
    pub fn rebuild(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut conn = self.lock()?;

        let live_path = collection_path(&self.dir, &self.collection);
        let tmp_path = live_path.with_extension("db.tmp");

        // Build the replacement collection off to the side.
        let _ = std::fs::remove_file(&tmp_path);
        let build = || -> Result<()> {
            let mut tmp = Connection::open(&tmp_path).map_err(StoreError::from)?;
            init_schema(&tmp)?;
            let tx = tmp.transaction().map_err(StoreError::from)?;
            insert_chunks(&tx, chunks)?;
            tx.commit().map_err(StoreError::from)?;
            Ok(())
        };
        if let Err(e) = build() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Close the live handle before the rename so the swap is clean on
        // every platform, then reattach.
        let placeholder = Connection::open_in_memory().map_err(StoreError::from)?;
        let old = std::mem::replace(&mut *conn, placeholder);
        drop(old);

        if let Err(e) = std::fs::rename(&tmp_path, &live_path) {
            let _ = std::fs::remove_file(&tmp_path);
            // Reattach the previous collection; it was never modified.
            *conn = Connection::open(&live_path).map_err(StoreError::from)?;
            return Err(StoreError::SwapFailed(e.to_string()).into());
        }

        *conn = Connection::open(&live_path).map_err(StoreError::from)?;
        debug!(collection = %self.collection, chunks = chunks.len(), "collection rebuilt");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(format!("store lock poisoned: {e}")).into())
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("dir", &self.dir)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn collection_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{collection}.db"))
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunks (
            chunk_id     TEXT PRIMARY KEY,
            doc_id       TEXT NOT NULL,
            chunk_index  INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            body_text    TEXT NOT NULL,
            building_id  TEXT NOT NULL,
            category     TEXT NOT NULL,
            version      TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            metadata     TEXT NOT NULL,
            embedding    BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_building ON chunks (building_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_category ON chunks (category);",
    )
    .map_err(StoreError::from)?;
    Ok(())
}

fn insert_chunks(conn: &Connection, chunks: &[EmbeddedChunk]) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "INSERT OR REPLACE INTO chunks
             (chunk_id, doc_id, chunk_index, total_chunks, body_text,
              building_id, category, version, last_updated, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .map_err(StoreError::from)?;

    for item in chunks {
        if item.embedding.len() != DIMENSIONS {
            return Err(StoreError::DimensionMismatch {
                got: item.embedding.len(),
                expected: DIMENSIONS,
            }
            .into());
        }
        let chunk = &item.chunk;
        let metadata = serde_json::to_string(&chunk.metadata).map_err(StoreError::from)?;
        stmt.execute(rusqlite::params![
            chunk.chunk_id,
            chunk.doc_id,
            chunk.chunk_index as i64,
            chunk.total_chunks as i64,
            chunk.body_text,
            chunk.building_id,
            chunk.category,
            chunk.version,
            chunk.last_updated.to_string(),
            metadata,
            embedding_to_bytes(&item.embedding),
        ])
        .map_err(StoreError::from)?;
    }
    Ok(())
}

fn build_filter_sql(filter: &MetadataFilter) -> (String, Vec<String>) {
    let mut sql = String::from(
        "SELECT chunk_id, doc_id, chunk_index, total_chunks, body_text,
                building_id, category, version, last_updated, metadata, embedding
         FROM chunks WHERE 1=1",
    );
    let mut params = Vec::new();
    if let Some(ref building) = filter.building_id {
        sql.push_str(" AND (building_id = ? OR building_id = 'all_buildings')");
        params.push(building.clone());
    }
    if let Some(ref category) = filter.category {
        sql.push_str(" AND lower(category) = lower(?)");
        params.push(category.clone());
    }
    (sql, params)
}

type ChunkRow = Result<(DocumentChunk, Vec<f32>)>;

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRow> {
    let chunk_id: String = row.get(0)?;
    let doc_id: String = row.get(1)?;
    let chunk_index: i64 = row.get(2)?;
    let total_chunks: i64 = row.get(3)?;
    let body_text: String = row.get(4)?;
    let building_id: String = row.get(5)?;
    let category: String = row.get(6)?;
    let version: String = row.get(7)?;
    let last_updated: String = row.get(8)?;
    let metadata_json: String = row.get(9)?;
    let embedding_bytes: Vec<u8> = row.get(10)?;

    Ok((|| {
        let metadata: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&metadata_json).map_err(StoreError::from)?;
        let last_updated = NaiveDate::parse_from_str(&last_updated, "%Y-%m-%d")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let chunk = DocumentChunk {
            chunk_id,
            doc_id,
            chunk_index: usize::try_from(chunk_index)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            total_chunks: usize::try_from(total_chunks)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            body_text,
            building_id,
            category,
            version,
            last_updated,
            metadata,
        };
        Ok((chunk, bytes_to_embedding(&embedding_bytes)))
    })())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
