//! Chunk table with exact nearest-neighbor search.
//!
//! Rows live in SQLite under `<data_dir>/vector/chunks.db`; embeddings are
//! little-endian f32 BLOBs. Search scans and ranks by inner product, which
//! equals cosine because providers return unit vectors. Exact scan is the
//! right trade at desktop corpus sizes; an ANN index slots in behind the
//! same `search` signature.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use finder_model::{
    location_from_json, location_to_json, ChunkId, ChunkLocation, ChunkRecord, FileId,
    SCHEMA_VERSION,
};
use finder_model::config::SchemaPolicy;
use rusqlite::{params, Connection, OptionalExtension};

use crate::StoreError;

/// One dense search result. `distance` is `1 - dot`; lower is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    pub chunk_index: u32,
    pub text: String,
    pub location: ChunkLocation,
    pub distance: f32,
}

/// The connection sits behind a mutex so the store is shareable across
/// reader threads; SQLite connections are not.
#[derive(Debug)]
pub struct VectorStore {
    conn: Mutex<Connection>,
    dimension: usize,
}

impl VectorStore {
    /// Open (or create) the store under `dir` for vectors of `dimension`
    /// components. A non-empty store with a different schema version or
    /// dimension is rejected or wiped per `policy`.
    pub fn open(dir: &Path, dimension: usize, policy: SchemaPolicy) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("chunks.db"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                tokens TEXT NOT NULL,
                metadata TEXT NOT NULL,
                content_indexed INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id);",
        )?;

        check_meta(&conn, dimension, policy)?;
        Ok(Self { conn: Mutex::new(conn), dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Bulk insert, one transaction per call so a file's chunks become
    /// visible together.
    pub fn add(&mut self, chunks: &[ChunkRecord]) -> Result<usize, StoreError> {
        for chunk in chunks {
            if chunk.embedding.len() != self.dimension {
                return Err(StoreError::Dimension {
                    got: chunk.embedding.len(),
                    expected: self.dimension,
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO chunks
                 (chunk_id, file_id, chunk_index, text, vector, tokens, metadata, content_indexed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
            )?;
            for chunk in chunks {
                let blob: &[u8] = bytemuck::cast_slice(&chunk.embedding);
                let tokens = serde_json::to_string(&chunk.tokens)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                stmt.execute(params![
                    chunk.chunk_id.as_str(),
                    chunk.file_id.as_str(),
                    chunk.chunk_index,
                    chunk.text,
                    blob,
                    tokens,
                    location_to_json(&chunk.location),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Cascade delete of every chunk belonging to `file_id`.
    pub fn delete_by_file(&mut self, file_id: &FileId) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id.as_str()])?;
        Ok(n)
    }

    /// Exact nearest-neighbor scan. Ties and equal distances order by
    /// chunk id so results are byte-stable.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        file_filter: Option<&HashSet<FileId>>,
    ) -> Result<Vec<VectorHit>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::Dimension { got: query.len(), expected: self.dimension });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT chunk_id, file_id, chunk_index, text, vector, metadata FROM chunks",
        )?;
        let mut rows = stmt.query([])?;

        let mut hits: Vec<VectorHit> = Vec::new();
        while let Some(row) = rows.next()? {
            let file_id = FileId(row.get::<_, String>(1)?);
            if let Some(filter) = file_filter {
                if !filter.contains(&file_id) {
                    continue;
                }
            }
            let blob: Vec<u8> = row.get(4)?;
            let vector: Vec<f32> = bytemuck::pod_collect_to_vec(&blob);
            if vector.len() != self.dimension {
                continue;
            }
            let dot: f32 = query.iter().zip(vector.iter()).map(|(a, b)| a * b).sum();
            hits.push(VectorHit {
                chunk_id: ChunkId(row.get::<_, String>(0)?),
                file_id,
                chunk_index: row.get::<_, u32>(2)?,
                text: row.get(3)?,
                location: location_from_json(&row.get::<_, String>(5)?),
                distance: 1.0 - dot,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// All chunks of one file, ordered by chunk index. Used by invariant
    /// checks and tests.
    pub fn get_by_file(&self, file_id: &FileId) -> Result<Vec<ChunkRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT chunk_id, file_id, chunk_index, text, vector, tokens, metadata
             FROM chunks WHERE file_id = ?1 ORDER BY chunk_index",
        )?;
        let mut rows = stmt.query(params![file_id.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let blob: Vec<u8> = row.get(4)?;
            let tokens: Vec<String> =
                serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
            out.push(ChunkRecord {
                chunk_id: ChunkId(row.get::<_, String>(0)?),
                file_id: FileId(row.get::<_, String>(1)?),
                chunk_index: row.get(2)?,
                text: row.get(3)?,
                embedding: bytemuck::pod_collect_to_vec(&blob),
                tokens,
                location: location_from_json(&row.get::<_, String>(6)?),
            });
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn count_by_file(&self, file_id: &FileId) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE file_id = ?1",
            params![file_id.as_str()],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM chunks", [])?;
        Ok(())
    }

    /// Writes commit per transaction; this forces a WAL checkpoint so the
    /// main db file is current before shutdown.
    pub fn flush(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

fn check_meta(conn: &Connection, dimension: usize, policy: SchemaPolicy) -> Result<(), StoreError> {
    let stored_version: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |r| r.get(0))
        .optional()?;
    let stored_dimension: Option<usize> = conn
        .query_row("SELECT value FROM meta WHERE key = 'dimension'", [], |r| {
            r.get::<_, String>(0)
        })
        .optional()?
        .and_then(|v| v.parse().ok());

    let populated: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
    let version_ok = stored_version.as_deref().map(|v| v == SCHEMA_VERSION).unwrap_or(true);
    let dimension_ok = stored_dimension.map(|d| d == dimension).unwrap_or(true);

    if populated > 0 && (!version_ok || !dimension_ok) {
        match policy {
            SchemaPolicy::Fail => {
                if !version_ok {
                    return Err(StoreError::Schema {
                        found: stored_version.unwrap_or_default(),
                        expected: SCHEMA_VERSION.to_string(),
                    });
                }
                return Err(StoreError::Dimension {
                    got: dimension,
                    expected: stored_dimension.unwrap_or(0),
                });
            }
            SchemaPolicy::Rebuild => {
                tracing::warn!("discarding vector store with incompatible schema");
                conn.execute("DELETE FROM chunks", [])?;
            }
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1), ('dimension', ?2)",
        params![SCHEMA_VERSION, dimension.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(file: &FileId, index: u32, text: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            chunk_id: ChunkId::generate(),
            file_id: file.clone(),
            chunk_index: index,
            text: text.to_string(),
            embedding,
            tokens: vec![text.to_string()],
            location: ChunkLocation { page: Some(index + 1), ..Default::default() },
        }
    }

    fn open_store(dir: &Path) -> VectorStore {
        VectorStore::open(dir, 3, SchemaPolicy::Fail).unwrap()
    }

    #[test]
    fn add_search_roundtrip_orders_by_distance() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let file = FileId::generate();

        store
            .add(&[
                chunk(&file, 0, "exact", vec![1.0, 0.0, 0.0]),
                chunk(&file, 1, "near", vec![0.8, 0.6, 0.0]),
                chunk(&file, 2, "far", vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "exact");
        assert!(hits[0].distance < 1e-6);
        assert_eq!(hits[1].text, "near");
        assert_eq!(hits[0].location.page, Some(1));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let file = FileId::generate();
        let err = store.add(&[chunk(&file, 0, "bad", vec![1.0, 0.0])]).unwrap_err();
        assert!(matches!(err, StoreError::Dimension { got: 2, expected: 3 }));
        assert!(matches!(
            store.search(&[1.0], 5, None),
            Err(StoreError::Dimension { .. })
        ));
    }

    #[test]
    fn delete_by_file_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let keep = FileId::generate();
        let drop = FileId::generate();

        store
            .add(&[
                chunk(&keep, 0, "keep", vec![1.0, 0.0, 0.0]),
                chunk(&drop, 0, "drop a", vec![0.0, 1.0, 0.0]),
                chunk(&drop, 1, "drop b", vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();

        assert_eq!(store.delete_by_file(&drop).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.count_by_file(&drop).unwrap(), 0);
        assert_eq!(store.get_by_file(&keep).unwrap().len(), 1);
    }

    #[test]
    fn file_filter_limits_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let a = FileId::generate();
        let b = FileId::generate();
        store
            .add(&[
                chunk(&a, 0, "in a", vec![1.0, 0.0, 0.0]),
                chunk(&b, 0, "in b", vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();

        let filter: HashSet<FileId> = [a.clone()].into_iter().collect();
        let hits = store.search(&[1.0, 0.0, 0.0], 10, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_id, a);
    }

    #[test]
    fn reopen_with_other_dimension_fails_when_populated() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(dir.path());
            let file = FileId::generate();
            store.add(&[chunk(&file, 0, "x", vec![1.0, 0.0, 0.0])]).unwrap();
        }
        assert!(matches!(
            VectorStore::open(dir.path(), 4, SchemaPolicy::Fail),
            Err(StoreError::Dimension { .. })
        ));
        let rebuilt = VectorStore::open(dir.path(), 4, SchemaPolicy::Rebuild).unwrap();
        assert_eq!(rebuilt.count().unwrap(), 0);
    }

    #[test]
    fn chunk_indices_roundtrip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let file = FileId::generate();
        store
            .add(&[
                chunk(&file, 2, "c", vec![0.0, 0.0, 1.0]),
                chunk(&file, 0, "a", vec![1.0, 0.0, 0.0]),
                chunk(&file, 1, "b", vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();
        let loaded = store.get_by_file(&file).unwrap();
        let indices: Vec<u32> = loaded.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
