//! Engine configuration with serde defaults so a partial JSON blob from the
//! host still yields a fully populated config.

use serde::{Deserialize, Serialize};

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_excel_max_rows() -> usize {
    1000
}

fn default_excel_max_cols() -> usize {
    50
}

fn default_top_k_dense() -> usize {
    50
}

fn default_top_k_bm25() -> usize {
    50
}

fn default_rrf_k() -> u32 {
    60
}

fn default_max_results() -> usize {
    20
}

fn default_max_evidences() -> usize {
    5
}

fn default_metadata_only_decay() -> f32 {
    0.4
}

fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cores.min(4)
}

/// Splitter parameters shared by every chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self { chunk_size: default_chunk_size(), chunk_overlap: default_chunk_overlap() }
    }
}

/// Hard caps applied while reading worksheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcelLimits {
    #[serde(default = "default_excel_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_excel_max_cols")]
    pub max_cols: usize,
}

impl Default for ExcelLimits {
    fn default() -> Self {
        Self { max_rows: default_excel_max_rows(), max_cols: default_excel_max_cols() }
    }
}

/// Retrieval-side knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default = "default_top_k_dense")]
    pub top_k_dense: usize,
    #[serde(default = "default_top_k_bm25")]
    pub top_k_bm25: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_evidences")]
    pub max_evidences_per_file: usize,
    /// Multiplier applied to files whose only lexical evidence is the
    /// filename. Keeps metadata-only hits from crowding out content matches.
    #[serde(default = "default_metadata_only_decay")]
    pub metadata_only_decay: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k_dense: default_top_k_dense(),
            top_k_bm25: default_top_k_bm25(),
            rrf_k: default_rrf_k(),
            max_results: default_max_results(),
            max_evidences_per_file: default_max_evidences(),
            metadata_only_decay: default_metadata_only_decay(),
        }
    }
}

/// Filesystem walk options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationOptions {
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size_bytes: Option<u64>,
    /// When set, only files with one of these lowercase extensions (with
    /// leading dot) are considered at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions_filter: Option<Vec<String>>,
    /// Glob patterns matched against the full path; matching entries are
    /// skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_patterns: Vec<String>,
}

/// What `open()` does when it finds persisted state with an incompatible
/// schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Refuse to open; the user decides what to do with the old data.
    Fail,
    /// Discard the incompatible state and start from an empty index.
    Rebuild,
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self::Fail
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub chunking: ChunkParams,
    #[serde(default)]
    pub excel: ExcelLimits,
    #[serde(default)]
    pub search: SearchParams,
    #[serde(default)]
    pub enumeration: EnumerationOptions,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub schema_policy: SchemaPolicy,
    /// Embedding dimension used for the zero vectors written in degraded
    /// mode; overridden by the live model's dimension when one is present.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

fn default_embedding_dimension() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkParams::default(),
            excel: ExcelLimits::default(),
            search: SearchParams::default(),
            enumeration: EnumerationOptions::default(),
            worker_count: default_worker_count(),
            schema_policy: SchemaPolicy::default(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"search":{"rrf_k":30}}"#).unwrap();
        assert_eq!(cfg.search.rrf_k, 30);
        assert_eq!(cfg.search.top_k_dense, 50);
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.search.metadata_only_decay, 0.4);
    }

    #[test]
    fn worker_count_is_bounded() {
        let cfg = EngineConfig::default();
        assert!(cfg.worker_count >= 1 && cfg.worker_count <= 4);
    }
}
