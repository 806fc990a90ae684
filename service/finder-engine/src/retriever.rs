//! Hybrid retrieval: dense + lexical with Reciprocal Rank Fusion on file
//! ids, metadata-only decay, and evidence assembly.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use finder_model::{
    Evidence, EvidenceScores, FileHit, FileId, FileRecord, MatchType, SearchResponse,
};
use finder_store::lexical::LexicalHit;
use finder_store::vector::VectorHit;

use crate::Engine;

const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Override `search.max_results` for this query.
    pub max_results: Option<usize>,
    /// Override `search.max_evidences_per_file` for this query.
    pub max_evidences: Option<usize>,
    /// Soft budget; on expiry the response carries whatever was fused so
    /// far and `error = "deadline"`.
    pub deadline: Option<Duration>,
}

pub fn search(engine: &Engine, query: &str, options: &SearchOptions) -> SearchResponse {
    let started = Instant::now();
    let degraded = engine.is_degraded();

    if query.trim().is_empty() {
        return SearchResponse::empty(query, degraded);
    }

    let params = &engine.config.search;
    let max_results = options.max_results.unwrap_or(params.max_results);
    let max_evidences = options.max_evidences.unwrap_or(params.max_evidences_per_file);
    let expired = |response_error: &mut Option<String>| -> bool {
        match options.deadline {
            Some(deadline) if started.elapsed() >= deadline => {
                *response_error = Some("deadline".to_string());
                true
            }
            _ => false,
        }
    };
    let mut error: Option<String> = None;

    let query_tokens = engine.tokenizer.tokenize(query);
    let query_vector = engine.embedder.as_ref().and_then(|embedder| {
        match embedder.embed(query) {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!("query embedding failed, dense retrieval skipped: {err}");
                None
            }
        }
    });

    let stores = engine.stores.read().unwrap();

    let dense: Vec<VectorHit> = match &query_vector {
        Some(vector) => match stores.vector.search(vector, params.top_k_dense, None) {
            Ok(hits) => hits,
            Err(err) => {
                tracing::error!("dense retrieval failed: {err}");
                error = Some(format!("vector store: {err}"));
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let lexical: Vec<LexicalHit> = if query_tokens.is_empty() || expired(&mut error) {
        Vec::new()
    } else {
        stores.lexical.search(&query_tokens, params.top_k_bm25)
    };

    // Reciprocal Rank Fusion keyed by file id: each list contributes
    // 1/(k + rank) at the file's first occurrence.
    let k = params.rrf_k as f32;
    let mut fused: BTreeMap<FileId, f32> = BTreeMap::new();

    let mut dense_files: HashSet<FileId> = HashSet::new();
    for hit in &dense {
        if dense_files.insert(hit.file_id.clone()) {
            let rank = dense_files.len() as f32;
            *fused.entry(hit.file_id.clone()).or_insert(0.0) += 1.0 / (k + rank);
        }
    }

    let mut lexical_files: HashSet<FileId> = HashSet::new();
    let mut file_level_files: HashSet<FileId> = HashSet::new();
    for hit in &lexical {
        if lexical_files.insert(hit.file_id.clone()) {
            let rank = lexical_files.len() as f32;
            *fused.entry(hit.file_id.clone()).or_insert(0.0) += 1.0 / (k + rank);
        }
        if hit.is_file_level {
            file_level_files.insert(hit.file_id.clone());
        }
    }

    // Filename-only matches are weak evidence; keep them from crowding out
    // content hits.
    for file_id in &file_level_files {
        if let Some(score) = fused.get_mut(file_id) {
            *score *= params.metadata_only_decay;
        }
    }

    let mut ranked: Vec<(FileId, f32)> = fused.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max_results);

    // Resolve selected ids back to file records in one manifest scan.
    let selected: HashSet<&FileId> = ranked.iter().map(|(id, _)| id).collect();
    let records: HashMap<FileId, FileRecord> = stores
        .manifest
        .records()
        .filter(|r| selected.contains(&r.file_id))
        .map(|r| (r.file_id.clone(), r.clone()))
        .collect();

    // Normalized lexical score per chunk, exposed on evidences.
    let lexical_by_doc: HashMap<&str, f32> =
        lexical.iter().map(|h| (h.doc_id.as_str(), h.score)).collect();

    let mut results: Vec<FileHit> = Vec::with_capacity(ranked.len());
    for (file_id, score) in ranked {
        if expired(&mut error) {
            break;
        }
        // A fused id without a manifest record is a late-deletion race;
        // dropped silently.
        let Some(record) = records.get(&file_id) else {
            continue;
        };

        let match_type = match (dense_files.contains(&file_id), lexical_files.contains(&file_id)) {
            (true, true) => MatchType::Hybrid,
            (true, false) => MatchType::Semantic,
            (false, _) => MatchType::Lexical,
        };

        let evidences = build_evidences(&dense, &lexical_by_doc, &file_id, max_evidences);

        results.push(FileHit {
            file_id,
            path: record.path.clone(),
            source: record.source,
            score,
            match_type,
            content_available: record.content_indexed,
            evidences,
        });
    }

    SearchResponse {
        query: query.to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        degraded,
        error,
        results,
    }
}

/// Up to `max_evidences` snippets from the file's dense hits, best first.
/// Pure lexical matches have no dense hits and therefore no evidences.
fn build_evidences(
    dense: &[VectorHit],
    lexical_by_doc: &HashMap<&str, f32>,
    file_id: &FileId,
    max_evidences: usize,
) -> Vec<Evidence> {
    // Dense hits are already ordered by ascending distance.
    dense
        .iter()
        .filter(|hit| &hit.file_id == file_id)
        .take(max_evidences)
        .map(|hit| {
            let similarity = (1.0 - hit.distance).max(0.0);
            let lexical = lexical_by_doc.get(hit.chunk_id.as_str()).copied().unwrap_or(0.0);
            Evidence {
                snippet: snippet(&hit.text),
                location: hit.location.clone(),
                scores: EvidenceScores { dense: similarity, lexical, fused: similarity },
            }
        })
        .collect()
}

fn snippet(text: &str) -> String {
    let mut out: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS {
        out.push('…');
    }
    out
}
