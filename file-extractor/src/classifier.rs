//! Extension-based file classification.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Whether a file's content is extracted or only its name is searchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    ContentIndexed,
    MetadataOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Word,
    Excel,
    PowerPoint,
    Pdf,
    Markdown,
    Text,
    Email,
    Other,
}

/// Map a path to its indexing category and type. Lowercase extension only;
/// legacy binary formats (.doc, .xls, .ppt) stay metadata-only because no
/// extractor handles them.
pub fn classify(path: &Path) -> (FileCategory, FileType) {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let file_type = match ext.as_str() {
        "docx" => FileType::Word,
        "xlsx" => FileType::Excel,
        "pptx" => FileType::PowerPoint,
        "pdf" => FileType::Pdf,
        "md" | "markdown" => FileType::Markdown,
        "txt" => FileType::Text,
        "eml" | "msg" => FileType::Email,
        _ => FileType::Other,
    };

    let category = match file_type {
        FileType::Other => FileCategory::MetadataOnly,
        _ => FileCategory::ContentIndexed,
    };

    (category, file_type)
}

pub fn is_content_indexed(path: &Path) -> bool {
    matches!(classify(path).0, FileCategory::ContentIndexed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_are_content_indexed() {
        for name in ["a.docx", "b.XLSX", "c.pptx", "d.pdf", "e.md", "f.markdown", "g.txt", "h.eml", "i.msg"] {
            let (cat, ty) = classify(Path::new(name));
            assert_eq!(cat, FileCategory::ContentIndexed, "{name}");
            assert_ne!(ty, FileType::Other, "{name}");
        }
    }

    #[test]
    fn everything_else_is_metadata_only() {
        for name in ["x.zip", "y.exe", "z.doc", "w.xls", "noext", "archive.tar.gz"] {
            let (cat, ty) = classify(Path::new(name));
            assert_eq!(cat, FileCategory::MetadataOnly, "{name}");
            assert_eq!(ty, FileType::Other, "{name}");
        }
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify(Path::new("REPORT.PDF")).1, FileType::Pdf);
    }
}
