//! Path -> fingerprint manifest powering incremental indexing.
//!
//! Persists as one schema-versioned JSON document. Saves are atomic-replace
//! (write temp, rename) so a crash mid-save leaves the previous file intact.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use finder_model::config::SchemaPolicy;
use finder_model::{FileRecord, Fingerprint, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// One path seen during enumeration, with its current fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFile {
    pub path: String,
    pub fingerprint: Fingerprint,
}

/// Outcome of comparing an enumeration pass against the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestDiff {
    pub new: Vec<ObservedFile>,
    pub modified: Vec<ObservedFile>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    schema_version: String,
    files: BTreeMap<String, FileRecord>,
    last_updated_at: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            files: BTreeMap::new(),
            last_updated_at: String::new(),
        }
    }
}

#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    manifest: Manifest,
    dirty: bool,
}

impl ManifestStore {
    /// Load the manifest at `path`, creating an empty one when absent.
    /// Incompatible schema versions either fail or discard per `policy`;
    /// unparseable files are treated as empty with a warning, matching the
    /// recover-and-reindex posture of the rest of the engine.
    pub fn open(path: impl Into<PathBuf>, policy: SchemaPolicy) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self { path, manifest: Manifest::default(), dirty: false });
        }

        let raw = std::fs::read_to_string(&path)?;
        let manifest = match serde_json::from_str::<Manifest>(&raw) {
            Ok(m) if m.schema_version == SCHEMA_VERSION => m,
            Ok(m) => match policy {
                SchemaPolicy::Fail => {
                    return Err(StoreError::Schema {
                        found: m.schema_version,
                        expected: SCHEMA_VERSION.to_string(),
                    })
                }
                SchemaPolicy::Rebuild => {
                    tracing::warn!(
                        found = %m.schema_version,
                        "discarding manifest with incompatible schema"
                    );
                    Manifest::default()
                }
            },
            Err(err) => {
                tracing::warn!("manifest unreadable, starting empty: {err}");
                Manifest::default()
            }
        };

        Ok(Self { path, manifest, dirty: false })
    }

    /// Atomic-replace save: serialize to `<path>.tmp`, then rename over the
    /// previous file. A clean store is left untouched so a no-op index pass
    /// does not alter the file.
    pub fn save(&mut self) -> Result<(), StoreError> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }
        self.manifest.last_updated_at = Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(&self.manifest)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.manifest.files.get(path)
    }

    pub fn put(&mut self, record: FileRecord) {
        self.manifest.files.insert(record.path.clone(), record);
        self.dirty = true;
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        let removed = self.manifest.files.remove(path);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn all_paths(&self) -> Vec<String> {
        self.manifest.files.keys().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.manifest.files.values()
    }

    pub fn len(&self) -> usize {
        self.manifest.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.manifest = Manifest::default();
        self.dirty = true;
    }

    /// Fingerprint-equality diff between an enumeration pass and the
    /// manifest. Paths in the manifest but absent from `observed` are
    /// reported deleted.
    pub fn diff(&self, observed: &[ObservedFile]) -> ManifestDiff {
        let mut diff = ManifestDiff::default();
        let mut seen: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();

        for file in observed {
            seen.insert(file.path.as_str());
            match self.manifest.files.get(&file.path) {
                None => diff.new.push(file.clone()),
                Some(record) if record.fingerprint == file.fingerprint => {
                    diff.unchanged.push(file.path.clone());
                }
                Some(_) => diff.modified.push(file.clone()),
            }
        }

        for path in self.manifest.files.keys() {
            if !seen.contains(path.as_str()) {
                diff.deleted.push(path.clone());
            }
        }
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finder_model::{FileId, SourceKind};

    fn record(path: &str, size: u64, mtime: i64) -> FileRecord {
        FileRecord {
            file_id: FileId::generate(),
            path: path.to_string(),
            source: SourceKind::Local,
            content_indexed: true,
            extension: ".txt".into(),
            author: None,
            fingerprint: Fingerprint { size_bytes: size, mtime_ms: mtime },
            chunk_count: 1,
            last_indexed_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn observed(path: &str, size: u64, mtime: i64) -> ObservedFile {
        ObservedFile { path: path.into(), fingerprint: Fingerprint { size_bytes: size, mtime_ms: mtime } }
    }

    #[test]
    fn save_then_load_yields_equal_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut store = ManifestStore::open(&path, SchemaPolicy::Fail).unwrap();
        store.put(record("/tmp/a.txt", 10, 100));
        store.put(record("/tmp/b.txt", 20, 200));
        store.save().unwrap();

        let reloaded = ManifestStore::open(&path, SchemaPolicy::Fail).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("/tmp/a.txt").unwrap().fingerprint,
            Fingerprint { size_bytes: 10, mtime_ms: 100 }
        );
        assert_eq!(
            reloaded.get("/tmp/b.txt").unwrap().file_id,
            store.get("/tmp/b.txt").unwrap().file_id
        );
    }

    #[test]
    fn clean_store_save_leaves_file_bytes_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut store = ManifestStore::open(&path, SchemaPolicy::Fail).unwrap();
        store.put(record("/tmp/a.txt", 10, 100));
        store.save().unwrap();
        let first = std::fs::read(&path).unwrap();

        store.save().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);

        let mut reloaded = ManifestStore::open(&path, SchemaPolicy::Fail).unwrap();
        reloaded.save().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn diff_buckets_new_modified_unchanged_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            ManifestStore::open(dir.path().join("manifest.json"), SchemaPolicy::Fail).unwrap();
        store.put(record("/tmp/same.txt", 10, 100));
        store.put(record("/tmp/changed.txt", 10, 100));
        store.put(record("/tmp/gone.txt", 10, 100));

        let diff = store.diff(&[
            observed("/tmp/same.txt", 10, 100),
            observed("/tmp/changed.txt", 11, 100),
            observed("/tmp/fresh.txt", 5, 50),
        ]);

        assert_eq!(diff.new.len(), 1);
        assert_eq!(diff.new[0].path, "/tmp/fresh.txt");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].path, "/tmp/changed.txt");
        assert_eq!(diff.unchanged, vec!["/tmp/same.txt".to_string()]);
        assert_eq!(diff.deleted, vec!["/tmp/gone.txt".to_string()]);
    }

    #[test]
    fn mtime_only_change_counts_as_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            ManifestStore::open(dir.path().join("manifest.json"), SchemaPolicy::Fail).unwrap();
        store.put(record("/tmp/a.txt", 10, 100));
        let diff = store.diff(&[observed("/tmp/a.txt", 10, 101)]);
        assert_eq!(diff.modified.len(), 1);
    }

    #[test]
    fn unknown_schema_fails_or_rebuilds_per_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"schema_version":"9.9","files":{},"last_updated_at":""}"#,
        )
        .unwrap();

        assert!(matches!(
            ManifestStore::open(&path, SchemaPolicy::Fail),
            Err(StoreError::Schema { .. })
        ));
        let rebuilt = ManifestStore::open(&path, SchemaPolicy::Rebuild).unwrap();
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn corrupt_manifest_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ManifestStore::open(&path, SchemaPolicy::Fail).unwrap();
        assert!(store.is_empty());
    }
}
