//! Filesystem enumeration with the built-in skip rules.

use std::path::Path;
use std::time::UNIX_EPOCH;

use finder_model::config::EnumerationOptions;
use finder_model::{Fingerprint, IndexError, IndexErrorKind};
use finder_store::manifest::ObservedFile;
use walkdir::WalkDir;

/// Directories never worth indexing: system trees, caches, VCS internals,
/// virtualenvs, build output.
const DENY_DIRS: &[&str] = &[
    "$recycle.bin",
    "appdata",
    "programdata",
    "windows",
    "program files",
    "program files (x86)",
    "__pycache__",
    "node_modules",
    ".git",
    ".svn",
    "venv",
    "env",
    "target",
    "temp",
    "tmp",
    "cache",
];

/// Scratch and build-artifact suffixes skipped at the file level.
const DENY_SUFFIXES: &[&str] = &[".tmp", ".bak", ".swp", ".pyc", ".pyo", ".o", ".obj", ".class"];

#[derive(Debug, Default)]
pub struct Enumeration {
    pub observed: Vec<ObservedFile>,
    pub errors: Vec<IndexError>,
    pub skipped_large: usize,
    pub skipped_empty: usize,
}

/// Walk `roots` and collect every indexable file with its fingerprint.
/// Per-entry IO failures are recorded and skipped; the walk continues.
pub fn enumerate(roots: &[impl AsRef<Path>], options: &EnumerationOptions) -> Enumeration {
    let patterns: Vec<glob::Pattern> = options
        .exclude_patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                tracing::warn!("ignoring invalid exclude pattern `{p}`: {err}");
                None
            }
        })
        .collect();

    let mut out = Enumeration::default();

    for root in roots {
        let root = root.as_ref();
        let mut walker = WalkDir::new(root).follow_links(false);
        if let Some(depth) = options.max_depth {
            walker = walker.max_depth(depth);
        }

        let iter = walker.into_iter().filter_entry(|entry| {
            // The root itself is never filtered, or nothing gets walked.
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                !skip_dir(&name, options.include_hidden)
            } else {
                !skip_file(&name, options.include_hidden)
            }
        });

        for entry in iter {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_else(|| root.to_string_lossy().into_owned());
                    out.errors.push(IndexError::new(IndexErrorKind::Io, path, format!("enumeration: {err}")));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            if let Some(filter) = &options.extensions_filter {
                let ext = path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                    .unwrap_or_default();
                if !filter.iter().any(|f| f.to_lowercase() == ext) {
                    continue;
                }
            }

            let path_str = path.to_string_lossy();
            if patterns.iter().any(|p| p.matches(&path_str)) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    out.errors.push(IndexError::new(
                        IndexErrorKind::Io,
                        path_str.into_owned(),
                        format!("stat: {err}"),
                    ));
                    continue;
                }
            };

            let size = metadata.len();
            if size == 0 {
                out.skipped_empty += 1;
                out.errors.push(IndexError::new(
                    IndexErrorKind::Parse,
                    path_str.into_owned(),
                    "empty file, skipped",
                ));
                continue;
            }
            if let Some(max) = options.max_file_size_bytes {
                if size > max {
                    out.skipped_large += 1;
                    continue;
                }
            }

            out.observed.push(ObservedFile {
                path: path_str.into_owned(),
                fingerprint: Fingerprint { size_bytes: size, mtime_ms: mtime_ms(&metadata) },
            });
        }
    }

    // Walk order is filesystem-dependent; a stable order keeps passes
    // reproducible.
    out.observed.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

pub fn mtime_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn skip_dir(name: &str, include_hidden: bool) -> bool {
    if !include_hidden && name.starts_with('.') {
        return true;
    }
    DENY_DIRS.contains(&name.to_lowercase().as_str())
}

fn skip_file(name: &str, include_hidden: bool) -> bool {
    if !include_hidden && name.starts_with('.') {
        return true;
    }
    if name.starts_with("~$") {
        return true;
    }
    let lower = name.to_lowercase();
    DENY_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn deny_rules_filter_dirs_and_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.txt"), "data");
        touch(&dir.path().join("node_modules/dep.txt"), "data");
        touch(&dir.path().join(".hidden/secret.txt"), "data");
        touch(&dir.path().join("~$lock.docx"), "data");
        touch(&dir.path().join("scratch.tmp"), "data");

        let result = enumerate(&[dir.path()], &EnumerationOptions::default());
        let paths: Vec<&str> =
            result.observed.iter().map(|o| o.path.rsplit('/').next().unwrap()).collect();
        assert_eq!(paths, vec!["keep.txt"]);
    }

    #[test]
    fn include_hidden_opens_dot_entries() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".hidden/secret.txt"), "data");

        let mut options = EnumerationOptions::default();
        assert!(enumerate(&[dir.path()], &options).observed.is_empty());
        options.include_hidden = true;
        assert_eq!(enumerate(&[dir.path()], &options).observed.len(), 1);
    }

    #[test]
    fn empty_files_are_skipped_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("empty.txt"), "");

        let result = enumerate(&[dir.path()], &EnumerationOptions::default());
        assert!(result.observed.is_empty());
        assert_eq!(result.skipped_empty, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("empty"));
    }

    #[test]
    fn size_cap_counts_skipped_large() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("big.txt"), &"x".repeat(100));
        touch(&dir.path().join("small.txt"), "x");

        let options = EnumerationOptions {
            max_file_size_bytes: Some(10),
            ..Default::default()
        };
        let result = enumerate(&[dir.path()], &options);
        assert_eq!(result.observed.len(), 1);
        assert_eq!(result.skipped_large, 1);
    }

    #[test]
    fn extension_filter_and_exclude_patterns_apply() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), "data");
        touch(&dir.path().join("b.pdf"), "data");
        touch(&dir.path().join("drafts/c.txt"), "data");

        let options = EnumerationOptions {
            extensions_filter: Some(vec![".txt".into()]),
            exclude_patterns: vec!["*/drafts/*".into()],
            ..Default::default()
        };
        let result = enumerate(&[dir.path()], &options);
        let names: Vec<&str> =
            result.observed.iter().map(|o| o.path.rsplit('/').next().unwrap()).collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[test]
    fn observed_paths_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("z.txt"), "z");
        touch(&dir.path().join("a.txt"), "a");
        let result = enumerate(&[dir.path()], &EnumerationOptions::default());
        let paths: Vec<_> = result.observed.iter().map(|o| o.path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }
}
