//! The offline search engine: incremental indexing over local files plus
//! hybrid dense/lexical retrieval with rank fusion.
//!
//! An [`Engine`] owns the three persistent stores (manifest, vector,
//! lexical) behind one process-wide reader-writer lock: searches take the
//! read side, the indexer holds the write side per file commit so a file's
//! old and new chunks are never visible together. Without an embedding
//! model the engine still indexes and serves lexical-only results, flagged
//! as degraded on every response.

pub mod connector;
pub mod enumerate;
pub mod indexer;
pub mod progress;
pub mod retriever;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use embedding_provider::Embedder;
use file_extractor::tokenizer::Tokenizer;
use finder_model::config::EngineConfig;
use finder_model::{EngineStats, SearchResponse};
use finder_store::lexical::LexicalStore;
use finder_store::manifest::ManifestStore;
use finder_store::vector::VectorStore;
use finder_store::StoreError;
use thiserror::Error;

pub use connector::{Connector, ConnectorError, ConnectorItem};
pub use indexer::IndexOptions;
pub use progress::{CancelToken, ProgressEvent, ProgressKind, ProgressSink};
pub use retriever::SearchOptions;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine already open for `{0}`")]
    AlreadyOpen(PathBuf),
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
}

pub(crate) struct Stores {
    pub manifest: ManifestStore,
    pub vector: VectorStore,
    pub lexical: LexicalStore,
}

pub struct Engine {
    pub(crate) data_dir: PathBuf,
    guard_key: PathBuf,
    pub(crate) config: EngineConfig,
    pub(crate) stores: RwLock<Stores>,
    pub(crate) embedder: Option<Arc<dyn Embedder>>,
    pub(crate) tokenizer: Tokenizer,
}

/// Stores must never be opened twice in one process; this registry enforces
/// it across `Engine` instances.
fn open_registry() -> &'static Mutex<BTreeSet<PathBuf>> {
    static REGISTRY: OnceLock<Mutex<BTreeSet<PathBuf>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(BTreeSet::new()))
}

impl Engine {
    /// Open the engine over `data_dir`, creating the directory and empty
    /// stores on first use. `embedder: None` selects degraded lexical-only
    /// operation.
    pub fn open(
        data_dir: impl Into<PathBuf>,
        config: EngineConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, EngineError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        let guard_key = data_dir.canonicalize()?;

        {
            let mut registry = open_registry().lock().unwrap();
            if !registry.insert(guard_key.clone()) {
                return Err(EngineError::AlreadyOpen(guard_key));
            }
        }

        match Self::open_stores(&data_dir, &config, embedder.as_deref()) {
            Ok(stores) => {
                let tokenizer = build_tokenizer();
                tracing::info!(
                    data_dir = %data_dir.display(),
                    degraded = embedder.is_none(),
                    "engine opened"
                );
                Ok(Self {
                    data_dir,
                    guard_key,
                    config,
                    stores: RwLock::new(stores),
                    embedder,
                    tokenizer,
                })
            }
            Err(err) => {
                open_registry().lock().unwrap().remove(&guard_key);
                Err(err)
            }
        }
    }

    fn open_stores(
        data_dir: &Path,
        config: &EngineConfig,
        embedder: Option<&dyn Embedder>,
    ) -> Result<Stores, EngineError> {
        let dimension = embedder
            .map(|e| e.dimension())
            .unwrap_or(config.embedding_dimension);

        let manifest =
            ManifestStore::open(data_dir.join("manifest.json"), config.schema_policy)?;
        let vector =
            VectorStore::open(&data_dir.join("vector"), dimension, config.schema_policy)?;
        let lexical = LexicalStore::open(data_dir.join("bm25.bin"), config.schema_policy)?;
        Ok(Stores { manifest, vector, lexical })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_degraded(&self) -> bool {
        self.embedder.is_none()
    }

    /// Index `roots` incrementally: unchanged files are skipped by
    /// fingerprint, vanished paths cascade out of every store.
    pub fn index(
        &self,
        roots: &[impl AsRef<Path>],
        options: IndexOptions,
    ) -> Result<finder_model::IndexReport, EngineError> {
        indexer::run(self, roots, options)
    }

    /// Materialize a connector's items and index them like local files,
    /// tagged with the connector's source. No deletion pruning: the
    /// connector's view is not a filesystem enumeration.
    pub fn index_connector(
        &self,
        connector: &mut dyn Connector,
        options: IndexOptions,
    ) -> Result<finder_model::IndexReport, EngineError> {
        indexer::run_connector(self, connector, options)
    }

    /// Hybrid search. Never hard-fails: store trouble and deadline expiry
    /// are reported in `SearchResponse.error`.
    pub fn search(&self, query: &str, options: &SearchOptions) -> SearchResponse {
        retriever::search(self, query, options)
    }

    /// Persist manifest and lexical state; the vector store is durable per
    /// commit already.
    pub fn flush(&self) -> Result<(), EngineError> {
        let mut stores = self.stores.write().unwrap();
        stores.manifest.save()?;
        stores.lexical.save()?;
        stores.vector.flush()?;
        Ok(())
    }

    /// Idle-time maintenance: physically drop lexical tombstones.
    pub fn compact(&self) -> Result<(), EngineError> {
        let mut stores = self.stores.write().unwrap();
        stores.lexical.compact();
        stores.lexical.save()?;
        Ok(())
    }

    /// Full wipe of all persisted state.
    pub fn clear(&self) -> Result<(), EngineError> {
        let mut stores = self.stores.write().unwrap();
        stores.manifest.clear();
        stores.manifest.save()?;
        stores.vector.clear()?;
        stores.lexical.clear();
        stores.lexical.save()?;
        tracing::info!("engine state cleared");
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        let stores = self.stores.read().unwrap();
        EngineStats {
            files: stores.manifest.len(),
            chunks: stores.vector.count().unwrap_or(0),
            lexical_documents: stores.lexical.document_count(),
        }
    }

    /// Flush and release the data directory.
    pub fn close(self) -> Result<(), EngineError> {
        self.flush()?;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        open_registry().lock().unwrap().remove(&self.guard_key);
    }
}

#[cfg(feature = "korean")]
fn build_tokenizer() -> Tokenizer {
    use file_extractor::korean::LinderaKoreanAnalyzer;
    let analyzer = LinderaKoreanAnalyzer::new()
        .map(|a| Arc::new(a) as Arc<dyn file_extractor::tokenizer::KoreanAnalyzer>);
    Tokenizer::new(analyzer)
}

#[cfg(not(feature = "korean"))]
fn build_tokenizer() -> Tokenizer {
    Tokenizer::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_the_same_data_dir_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = Engine::open(dir.path(), EngineConfig::default(), None).unwrap();
        let second = Engine::open(dir.path(), EngineConfig::default(), None);
        assert!(matches!(second, Err(EngineError::AlreadyOpen(_))));
        drop(first);
        // Released on drop; a fresh open succeeds.
        let third = Engine::open(dir.path(), EngineConfig::default(), None);
        assert!(third.is_ok());
    }
}
