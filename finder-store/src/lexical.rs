//! Persistent BM25 index over chunk tokens and file-level tokens.
//!
//! The two document flavors (chunk-level for content-indexed files,
//! file-level for metadata-only files) share one tagged document type so
//! retrieval interleaves them and the retriever can decay file-level hits
//! uniformly. Removal tombstones; `compact()` physically drops tombstones
//! and rebuilds statistics, and is never required for correctness.

use std::collections::HashMap;
use std::path::PathBuf;

use finder_model::config::SchemaPolicy;
use finder_model::{FileId, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};

use crate::StoreError;

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// BM25 unit: either one chunk of a content-indexed file (`doc_id` is the
/// chunk id) or the filename tokens of a metadata-only file (`doc_id` is the
/// file id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalDocument {
    pub doc_id: String,
    pub file_id: FileId,
    pub tokens: Vec<String>,
    pub is_file_level: bool,
}

/// One lexical search result. `score` is normalized to [0, 1] by the max in
/// the result set.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub doc_id: String,
    pub file_id: FileId,
    pub score: f32,
    pub is_file_level: bool,
}

/// Serialized form: documents plus the derived statistics, so a load does
/// not need a full recount to start serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LexicalIndexData {
    schema_version: String,
    /// Tombstoned slots are `None` until compaction.
    documents: Vec<Option<LexicalDocument>>,
    doc_index: HashMap<String, usize>,
    file_docs: HashMap<String, Vec<String>>,
    /// Document frequency per token over live documents.
    doc_frequency: HashMap<String, u32>,
    total_token_count: u64,
    live_count: u32,
}

impl Default for LexicalIndexData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            documents: Vec::new(),
            doc_index: HashMap::new(),
            file_docs: HashMap::new(),
            doc_frequency: HashMap::new(),
            total_token_count: 0,
            live_count: 0,
        }
    }
}

#[derive(Debug)]
pub struct LexicalStore {
    path: PathBuf,
    data: LexicalIndexData,
    /// token -> live document slots; rebuilt on load, maintained on mutation.
    postings: HashMap<String, Vec<usize>>,
}

impl LexicalStore {
    pub fn open(path: impl Into<PathBuf>, policy: SchemaPolicy) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = std::fs::read(&path)?;
            match bincode::deserialize::<LexicalIndexData>(&bytes) {
                Ok(d) if d.schema_version == SCHEMA_VERSION => d,
                Ok(d) => match policy {
                    SchemaPolicy::Fail => {
                        return Err(StoreError::Schema {
                            found: d.schema_version,
                            expected: SCHEMA_VERSION.to_string(),
                        })
                    }
                    SchemaPolicy::Rebuild => {
                        tracing::warn!(
                            found = %d.schema_version,
                            "discarding lexical index with incompatible schema"
                        );
                        LexicalIndexData::default()
                    }
                },
                Err(err) => {
                    tracing::warn!("lexical index unreadable, starting empty: {err}");
                    LexicalIndexData::default()
                }
            }
        } else {
            LexicalIndexData::default()
        };

        let mut store = Self { path, data, postings: HashMap::new() };
        store.rebuild_postings();
        Ok(store)
    }

    fn rebuild_postings(&mut self) {
        self.postings.clear();
        for (slot, doc) in self.data.documents.iter().enumerate() {
            if let Some(doc) = doc {
                for token in &doc.tokens {
                    self.postings.entry(token.clone()).or_default().push(slot);
                }
            }
        }
    }

    /// Atomic-replace save of the packed index.
    pub fn save(&self) -> Result<(), StoreError> {
        let bytes = bincode::serialize(&self.data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn add_document(&mut self, doc: LexicalDocument) {
        if doc.tokens.is_empty() {
            return;
        }
        if self.data.doc_index.contains_key(&doc.doc_id) {
            self.remove_document(&doc.doc_id.clone());
        }

        let slot = self.data.documents.len();
        self.data.doc_index.insert(doc.doc_id.clone(), slot);
        self.data
            .file_docs
            .entry(doc.file_id.as_str().to_string())
            .or_default()
            .push(doc.doc_id.clone());

        for token in &doc.tokens {
            *self.data.doc_frequency.entry(token.clone()).or_insert(0) += 1;
            self.postings.entry(token.clone()).or_default().push(slot);
        }
        self.data.total_token_count += doc.tokens.len() as u64;
        self.data.live_count += 1;
        self.data.documents.push(Some(doc));
    }

    fn remove_document(&mut self, doc_id: &str) {
        let Some(slot) = self.data.doc_index.remove(doc_id) else {
            return;
        };
        let Some(doc) = self.data.documents[slot].take() else {
            return;
        };

        for token in &doc.tokens {
            if let Some(df) = self.data.doc_frequency.get_mut(token) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    self.data.doc_frequency.remove(token);
                }
            }
            if let Some(slots) = self.postings.get_mut(token) {
                slots.retain(|&s| s != slot);
                if slots.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
        self.data.total_token_count =
            self.data.total_token_count.saturating_sub(doc.tokens.len() as u64);
        self.data.live_count = self.data.live_count.saturating_sub(1);

        if let Some(ids) = self.data.file_docs.get_mut(doc.file_id.as_str()) {
            ids.retain(|d| d != doc_id);
        }
    }

    /// Tombstone every document of a file (chunk-level and file-level alike).
    pub fn remove_by_file(&mut self, file_id: &FileId) -> usize {
        let Some(doc_ids) = self.data.file_docs.remove(file_id.as_str()) else {
            return 0;
        };
        let count = doc_ids.len();
        for doc_id in doc_ids {
            self.remove_document(&doc_id);
        }
        count
    }

    /// BM25 Okapi over live documents, normalized to [0, 1] by the best
    /// score in the result set. Ties order by doc id for determinism.
    pub fn search(&self, query_tokens: &[String], top_k: usize) -> Vec<LexicalHit> {
        if query_tokens.is_empty() || top_k == 0 || self.data.live_count == 0 {
            return Vec::new();
        }

        let n = self.data.live_count as f32;
        let avgdl = if self.data.live_count > 0 {
            self.data.total_token_count as f32 / self.data.live_count as f32
        } else {
            0.0
        };

        let mut scores: HashMap<usize, f32> = HashMap::new();
        for token in query_tokens {
            let Some(df) = self.data.doc_frequency.get(token) else {
                continue;
            };
            let idf = (1.0 + (n - *df as f32 + 0.5) / (*df as f32 + 0.5)).ln();
            let Some(slots) = self.postings.get(token) else {
                continue;
            };
            for &slot in slots {
                let Some(doc) = self.data.documents[slot].as_ref() else {
                    continue;
                };
                let tf = doc.tokens.iter().filter(|t| *t == token).count() as f32;
                let dl = doc.tokens.len() as f32;
                let denom = tf + K1 * (1.0 - B + B * dl / avgdl.max(f32::EPSILON));
                *scores.entry(slot).or_insert(0.0) += idf * tf * (K1 + 1.0) / denom;
            }
        }

        let mut ranked: Vec<(usize, f32)> =
            scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1).then_with(|| {
                let da = self.data.documents[a.0].as_ref().map(|d| d.doc_id.as_str());
                let db = self.data.documents[b.0].as_ref().map(|d| d.doc_id.as_str());
                da.cmp(&db)
            })
        });
        ranked.truncate(top_k);

        let max = ranked.first().map(|(_, s)| *s).unwrap_or(1.0).max(f32::EPSILON);
        ranked
            .into_iter()
            .filter_map(|(slot, score)| {
                self.data.documents[slot].as_ref().map(|doc| LexicalHit {
                    doc_id: doc.doc_id.clone(),
                    file_id: doc.file_id.clone(),
                    score: score / max,
                    is_file_level: doc.is_file_level,
                })
            })
            .collect()
    }

    /// Physically discard tombstones and rebuild every statistic. Safe to
    /// run at idle; never required for correctness.
    pub fn compact(&mut self) {
        let live: Vec<LexicalDocument> =
            self.data.documents.drain(..).flatten().collect();

        self.data = LexicalIndexData::default();
        self.postings.clear();
        for doc in live {
            self.add_document(doc);
        }
    }

    pub fn document_count(&self) -> usize {
        self.data.live_count as usize
    }

    pub fn slot_count(&self) -> usize {
        self.data.documents.len()
    }

    pub fn file_count(&self) -> usize {
        self.data.file_docs.values().filter(|v| !v.is_empty()).count()
    }

    pub fn docs_for_file(&self, file_id: &FileId) -> usize {
        self.data.file_docs.get(file_id.as_str()).map(|v| v.len()).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.data = LexicalIndexData::default();
        self.postings.clear();
    }
}
