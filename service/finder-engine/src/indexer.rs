//! The incremental indexing orchestrator.
//!
//! One pass: enumerate -> diff against the manifest -> pipeline changed
//! files (classify, extract, chunk, tokenize, embed) -> commit per file
//! under the write lock -> cascade deletes -> flush. Extraction and
//! embedding run outside any lock; only the commit holds it, so a file's
//! old and new data swap atomically with respect to searches.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use file_extractor::chunker::chunk_extract;
use file_extractor::classifier::{classify, FileCategory};
use finder_model::config::EnumerationOptions;
use finder_model::{
    ChunkId, ChunkRecord, FileId, FileRecord, IndexError, IndexErrorKind, IndexReport,
    SourceKind,
};
use finder_store::lexical::LexicalDocument;
use finder_store::manifest::ObservedFile;
use finder_store::StoreError;

use crate::connector::Connector;
use crate::enumerate::{enumerate, Enumeration};
use crate::progress::{CancelToken, ProgressEvent, ProgressKind, ProgressSink};
use crate::{Engine, EngineError};

#[derive(Clone, Default)]
pub struct IndexOptions {
    /// Override the engine-level enumeration options for this pass.
    pub enumeration: Option<EnumerationOptions>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub cancel: Option<CancelToken>,
}

/// Index filesystem roots with deletion pruning.
pub fn run(
    engine: &Engine,
    roots: &[impl AsRef<Path>],
    options: IndexOptions,
) -> Result<IndexReport, EngineError> {
    let enum_options = options
        .enumeration
        .clone()
        .unwrap_or_else(|| engine.config.enumeration.clone());
    let enumeration = enumerate(roots, &enum_options);
    process(engine, enumeration, options, true, SourceKind::Local)
}

/// Index a connector's materialized items. The connector's listing is not a
/// filesystem enumeration, so nothing is pruned.
pub fn run_connector(
    engine: &Engine,
    connector: &mut dyn Connector,
    options: IndexOptions,
) -> Result<IndexReport, EngineError> {
    let source = connector.source();
    let mut enumeration = Enumeration::default();

    for item in connector.items()? {
        let local = match connector.materialize(&item) {
            Ok(p) => p,
            Err(err) => {
                enumeration.errors.push(IndexError::new(
                    IndexErrorKind::Io,
                    item.path_or_blob.clone(),
                    format!("materialize: {err}"),
                ));
                continue;
            }
        };
        match std::fs::metadata(&local) {
            Ok(metadata) if metadata.len() > 0 => {
                enumeration.observed.push(ObservedFile {
                    path: local.to_string_lossy().into_owned(),
                    fingerprint: finder_model::Fingerprint {
                        size_bytes: metadata.len(),
                        mtime_ms: crate::enumerate::mtime_ms(&metadata),
                    },
                });
            }
            Ok(_) => enumeration.skipped_empty += 1,
            Err(err) => enumeration.errors.push(IndexError::new(
                IndexErrorKind::Io,
                local.to_string_lossy().into_owned(),
                format!("stat: {err}"),
            )),
        }
    }
    enumeration.observed.sort_by(|a, b| a.path.cmp(&b.path));

    process(engine, enumeration, options, false, source)
}

#[derive(Default)]
struct Accum {
    content_indexed: usize,
    metadata_only: usize,
    errors: Vec<IndexError>,
    fatal: Option<StoreError>,
}

fn process(
    engine: &Engine,
    enumeration: Enumeration,
    options: IndexOptions,
    prune_deleted: bool,
    source: SourceKind,
) -> Result<IndexReport, EngineError> {
    let started = Instant::now();
    let total = enumeration.observed.len();
    let progress = options.progress.clone();
    let cancel = options.cancel.clone().unwrap_or_default();

    let diff = {
        let stores = engine.stores.read().unwrap();
        stores.manifest.diff(&enumeration.observed)
    };

    // Deletions are handled work too, even though enumeration never saw them.
    let progress_total = total + if prune_deleted { diff.deleted.len() } else { 0 };
    let processed = AtomicUsize::new(0);
    let emit = |path: &str, kind: ProgressKind| {
        let n = processed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(sink) = &progress {
            sink.on_progress(&ProgressEvent {
                total: progress_total,
                processed: n,
                current_path: path.to_string(),
                kind,
            });
        }
    };
    tracing::info!(
        total,
        new = diff.new.len(),
        modified = diff.modified.len(),
        unchanged = diff.unchanged.len(),
        deleted = if prune_deleted { diff.deleted.len() } else { 0 },
        "index pass starting"
    );

    let mut report = IndexReport {
        total,
        skipped_unchanged: diff.unchanged.len(),
        skipped_large: enumeration.skipped_large,
        errors: enumeration.errors,
        ..Default::default()
    };

    for path in &diff.unchanged {
        emit(path, ProgressKind::SkippedUnchanged);
    }

    // Cascade deletes first so renamed files do not briefly shadow their
    // old entries.
    if prune_deleted {
        let mut stores = engine.stores.write().unwrap();
        for path in &diff.deleted {
            let Some(record) = stores.manifest.remove(path) else {
                continue;
            };
            if let Err(err) = stores.vector.delete_by_file(&record.file_id) {
                return Err(fatal_cleanup(err));
            }
            stores.lexical.remove_by_file(&record.file_id);
            report.deleted += 1;
            emit(path, ProgressKind::Deleted);
        }
    }

    let work: Vec<(ObservedFile, ProgressKind)> = diff
        .new
        .into_iter()
        .map(|f| (f, ProgressKind::New))
        .chain(diff.modified.into_iter().map(|f| (f, ProgressKind::Modified)))
        .collect();

    let accum = Mutex::new(Accum::default());
    let fatal_seen = AtomicBool::new(false);

    let handle_one = |(file, kind): &(ObservedFile, ProgressKind)| {
        if cancel.is_cancelled() || fatal_seen.load(Ordering::Relaxed) {
            return;
        }
        match index_one_file(engine, file, source) {
            Ok(FileOutcome::Content) => {
                accum.lock().unwrap().content_indexed += 1;
                emit(&file.path, *kind);
            }
            Ok(FileOutcome::Metadata) => {
                accum.lock().unwrap().metadata_only += 1;
                emit(&file.path, *kind);
            }
            Err(FileFailure::Recoverable(kind, message)) => {
                tracing::debug!(path = %file.path, %message, "file skipped");
                accum
                    .lock()
                    .unwrap()
                    .errors
                    .push(IndexError::new(kind, file.path.clone(), message));
                emit(&file.path, ProgressKind::Error);
            }
            Err(FileFailure::Storage(err)) => {
                fatal_seen.store(true, Ordering::Relaxed);
                let mut a = accum.lock().unwrap();
                if a.fatal.is_none() {
                    a.fatal = Some(err);
                }
            }
        }
    };

    let workers = engine.config.worker_count.max(1);
    if workers <= 1 || work.len() <= 1 {
        work.iter().for_each(handle_one);
    } else {
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| {
                use rayon::prelude::*;
                work.par_iter().for_each(handle_one);
            }),
            Err(err) => {
                tracing::warn!("worker pool unavailable, indexing sequentially: {err}");
                work.iter().for_each(handle_one);
            }
        }
    }

    let accum = accum.into_inner().unwrap();
    if let Some(err) = accum.fatal {
        return Err(fatal_cleanup(err));
    }

    report.content_indexed = accum.content_indexed;
    report.metadata_only = accum.metadata_only;
    report.indexed = accum.content_indexed + accum.metadata_only;
    report.errors.extend(accum.errors);
    report.cancelled = cancel.is_cancelled();

    // Commit the pass: manifest and lexical state hit disk here, vector
    // batches are durable already.
    {
        let mut stores = engine.stores.write().unwrap();
        stores.manifest.save()?;
        stores.lexical.save()?;
        stores.vector.flush()?;
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        indexed = report.indexed,
        deleted = report.deleted,
        errors = report.errors.len(),
        cancelled = report.cancelled,
        elapsed_ms = report.elapsed_ms,
        "index pass finished"
    );
    Ok(report)
}

/// A storage failure aborts the pass with nothing further persisted; the
/// on-disk manifest stays at its pre-pass state.
fn fatal_cleanup(err: StoreError) -> EngineError {
    tracing::error!("storage failure aborted index pass: {err}");
    EngineError::Store(err)
}

enum FileOutcome {
    Content,
    Metadata,
}

enum FileFailure {
    /// Recorded, file retried next pass.
    Recoverable(IndexErrorKind, String),
    /// Aborts the whole pass.
    Storage(StoreError),
}

impl From<StoreError> for FileFailure {
    fn from(err: StoreError) -> Self {
        FileFailure::Storage(err)
    }
}

/// Run one file through the pipeline and commit it. Extraction, chunking
/// and embedding happen before the write lock is taken.
fn index_one_file(
    engine: &Engine,
    file: &ObservedFile,
    source: SourceKind,
) -> Result<FileOutcome, FileFailure> {
    let path = Path::new(&file.path);
    let (category, file_type) = classify(path);
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    let prior_id = {
        let stores = engine.stores.read().unwrap();
        stores.manifest.get(&file.path).map(|r| r.file_id.clone())
    };
    // file_id is stable across modifications; external consumers link to it.
    let file_id = prior_id.clone().unwrap_or_else(FileId::generate);
    let now = Utc::now().to_rfc3339();

    if category == FileCategory::MetadataOnly {
        let tokens = engine.tokenizer.tokenize_path(path);
        let record = FileRecord {
            file_id: file_id.clone(),
            path: file.path.clone(),
            source,
            content_indexed: false,
            extension,
            author: None,
            fingerprint: file.fingerprint,
            chunk_count: 0,
            last_indexed_at: now,
        };

        let mut stores = engine.stores.write().unwrap();
        if prior_id.is_some() {
            stores.vector.delete_by_file(&file_id)?;
            stores.lexical.remove_by_file(&file_id);
        }
        stores.lexical.add_document(LexicalDocument {
            doc_id: file_id.as_str().to_string(),
            file_id: file_id.clone(),
            tokens,
            is_file_level: true,
        });
        stores.manifest.put(record);
        return Ok(FileOutcome::Metadata);
    }

    let result = file_extractor::extract(path, file_type, &engine.config.excel);
    if let Some(message) = &result.error {
        return Err(FileFailure::Recoverable(IndexErrorKind::Parse, format!("extract: {message}")));
    }
    if !result.ok() {
        return Err(FileFailure::Recoverable(IndexErrorKind::Parse, "extract: no text content".into()));
    }
    if result.failed_pages > 0 {
        tracing::debug!(path = %file.path, failed_pages = result.failed_pages, "partial extraction");
    }

    let chunks = chunk_extract(&result, file_type, &engine.config.chunking);
    if chunks.is_empty() {
        return Err(FileFailure::Recoverable(IndexErrorKind::Parse, "chunker produced no chunks".into()));
    }

    let embeddings = match &engine.embedder {
        Some(embedder) => {
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            embedder
                .embed_batch(&texts)
                .map_err(|err| FileFailure::Recoverable(IndexErrorKind::Model, format!("embed: {err}")))?
        }
        // Degraded mode: chunks stay searchable lexically; dense rows carry
        // zero vectors until a model shows up and the corpus reindexes.
        None => {
            let dimension = engine.config.embedding_dimension;
            vec![vec![0.0; dimension]; chunks.len()]
        }
    };

    let records: Vec<ChunkRecord> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| ChunkRecord {
            chunk_id: ChunkId::generate(),
            file_id: file_id.clone(),
            chunk_index: chunk.chunk_index,
            tokens: engine.tokenizer.tokenize(&chunk.text),
            text: chunk.text,
            embedding,
            location: chunk.location,
        })
        .collect();

    let record = FileRecord {
        file_id: file_id.clone(),
        path: file.path.clone(),
        source,
        content_indexed: true,
        extension,
        author: result.metadata.get("author").cloned(),
        fingerprint: file.fingerprint,
        chunk_count: records.len() as u32,
        last_indexed_at: now,
    };

    // Atomic swap: old data out, new data in, one lock hold.
    let mut stores = engine.stores.write().unwrap();
    if prior_id.is_some() {
        stores.vector.delete_by_file(&file_id)?;
        stores.lexical.remove_by_file(&file_id);
    }
    stores.vector.add(&records)?;
    for chunk in &records {
        stores.lexical.add_document(LexicalDocument {
            doc_id: chunk.chunk_id.as_str().to_string(),
            file_id: file_id.clone(),
            tokens: chunk.tokens.clone(),
            is_file_level: false,
        });
    }
    stores.manifest.put(record);
    Ok(FileOutcome::Content)
}
