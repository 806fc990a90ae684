//! Shared models used across the finder crates.

pub mod config;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema tag carried by every persisted artifact (manifest, vector table,
/// lexical index). Readers reject or rebuild on mismatch depending on policy.
pub const SCHEMA_VERSION: &str = "2.0";

/// Stable logical id for a file. Assigned on first index and preserved across
/// modifications of the same path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id of one searchable chunk. UUIDs throughout; never derived from paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a file came from. Connector-deposited blobs keep their origin tag;
/// the indexing pipeline treats them all as local paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Outlook,
    OneDrive,
    SharePoint,
}

impl Default for SourceKind {
    fn default() -> Self {
        Self::Local
    }
}

/// Change-detection fingerprint. Equality means "unchanged" for indexing.
/// Extensible: a future content hash is an additional optional field, so the
/// tuple comparison stays valid for old manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size_bytes: u64,
    pub mtime_ms: i64,
}

/// One record per known path. Owned exclusively by the manifest store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub path: String,
    #[serde(default)]
    pub source: SourceKind,
    pub content_indexed: bool,
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub fingerprint: Fingerprint,
    pub chunk_count: u32,
    /// RFC 3339 timestamp of the pass that captured `fingerprint`.
    pub last_indexed_at: String,
}

/// Location metadata attached to a chunk so results can say where in the
/// document the match lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_range: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl ChunkLocation {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One searchable chunk of a content-indexed file. Owned exclusively by the
/// vector store; refers back to its file by opaque id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    /// Dense 0-based position within the file.
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Vec<f32>,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub location: ChunkLocation,
}

/// How a file matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Present in both the dense and the lexical result lists.
    Hybrid,
    /// Dense-only.
    Semantic,
    /// Lexical-only (including filename-only matches).
    Lexical,
}

/// Per-evidence score breakdown. `lexical` is the per-query normalized BM25
/// score of the same chunk when it also appeared lexically, else 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScores {
    pub dense: f32,
    pub lexical: f32,
    #[serde(rename = "final")]
    pub fused: f32,
}

/// A snippet justifying why a file matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub snippet: String,
    #[serde(default)]
    pub location: ChunkLocation,
    pub scores: EvidenceScores,
}

/// One ranked file in a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHit {
    pub file_id: FileId,
    pub path: String,
    #[serde(default)]
    pub source: SourceKind,
    /// Fused RRF score (after metadata-only decay). Orders the result list.
    pub score: f32,
    pub match_type: MatchType,
    /// False for metadata-only files: nothing beyond the filename matched.
    pub content_available: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidences: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub elapsed_ms: u64,
    /// True when the engine runs without an embedding model (lexical-only).
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub results: Vec<FileHit>,
}

impl SearchResponse {
    pub fn empty(query: impl Into<String>, degraded: bool) -> Self {
        Self {
            query: query.into(),
            elapsed_ms: 0,
            degraded,
            error: None,
            results: Vec::new(),
        }
    }
}

/// Kind of a recoverable per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexErrorKind {
    /// Filesystem read/stat failure; skipped and retried next pass.
    Io,
    /// Extractor could not produce text.
    Parse,
    /// Embedding failed for this file's batch.
    Model,
}

/// One recoverable per-file failure surfaced by an index pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexError {
    pub path: String,
    pub kind: IndexErrorKind,
    pub message: String,
}

impl IndexError {
    pub fn new(kind: IndexErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), kind, message: message.into() }
    }
}

/// Summary of one `index()` pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Files seen by enumeration.
    pub total: usize,
    /// Files (re)indexed this pass, content and metadata-only combined.
    pub indexed: usize,
    pub content_indexed: usize,
    pub metadata_only: usize,
    pub deleted: usize,
    pub skipped_unchanged: usize,
    pub skipped_large: usize,
    pub errors: Vec<IndexError>,
    pub elapsed_ms: u64,
    /// Set when the pass stopped early on a cancellation token.
    #[serde(default)]
    pub cancelled: bool,
}

/// Aggregate store counts, exposed for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub files: usize,
    pub chunks: usize,
    pub lexical_documents: usize,
}

/// Serialized alongside vectors so the on-disk row stays self-describing.
pub fn location_to_json(location: &ChunkLocation) -> String {
    serde_json::to_string(location).unwrap_or_else(|_| "{}".to_string())
}

pub fn location_from_json(raw: &str) -> ChunkLocation {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Free-form document metadata captured by extractors (author, title, ...).
pub type DocMetadata = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_unique_per_generate() {
        let a = FileId::generate();
        let b = FileId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_equality_is_tuple_equality() {
        let a = Fingerprint { size_bytes: 10, mtime_ms: 1_700_000_000_000 };
        let b = Fingerprint { size_bytes: 10, mtime_ms: 1_700_000_000_000 };
        let c = Fingerprint { size_bytes: 11, mtime_ms: 1_700_000_000_000 };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn location_json_roundtrip_drops_nothing() {
        let loc = ChunkLocation {
            page: Some(3),
            header_path: vec!["Intro".into(), "Scope".into()],
            ..Default::default()
        };
        let parsed = location_from_json(&location_to_json(&loc));
        assert_eq!(parsed, loc);
    }

    #[test]
    fn location_json_tolerates_garbage() {
        assert_eq!(location_from_json("not json"), ChunkLocation::default());
    }
}
