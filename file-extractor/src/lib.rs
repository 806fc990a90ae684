//! Content extraction, structural chunking and lexical tokenization.
//!
//! The extractor registry is a closed dispatch over [`classifier::FileType`]:
//! each reader turns one format into plain text plus an ordered list of
//! [`section::Section`]s so the chunker can attach location metadata.
//! Extractors never panic and never return `Err`; failure is an
//! [`ExtractResult`] with `error` set and empty text, which the indexer
//! records and retries on the next pass.

pub mod classifier;
pub mod chunker;
pub(crate) mod ooxml;
pub mod reader_docx;
pub mod reader_eml;
pub mod reader_pdf;
pub mod reader_pptx;
pub mod reader_text;
pub mod reader_xlsx;
pub mod section;
pub mod tokenizer;
#[cfg(feature = "korean")]
pub mod korean;

use std::path::Path;

use finder_model::config::ExcelLimits;
use finder_model::DocMetadata;

use classifier::FileType;
use section::Section;

/// Result bundle from one extraction attempt.
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    pub text: String,
    pub sections: Vec<Section>,
    pub metadata: DocMetadata,
    pub error: Option<String>,
    /// Pages the PDF reader had to skip (counted, not fatal).
    pub failed_pages: u32,
}

impl ExtractResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Default::default() }
    }

    pub fn ok(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

/// Extract text and structure from `path` according to its classified type.
///
/// `Other` has no extractor; callers must not route metadata-only files here.
pub fn extract(path: &Path, file_type: FileType, excel: &ExcelLimits) -> ExtractResult {
    match file_type {
        FileType::Word => reader_docx::extract(path),
        FileType::Excel => reader_xlsx::extract(path, excel),
        FileType::PowerPoint => reader_pptx::extract(path),
        FileType::Pdf => reader_pdf::extract(path),
        FileType::Markdown => reader_text::extract_markdown(path),
        FileType::Text => reader_text::extract_plain(path),
        FileType::Email => reader_eml::extract(path),
        FileType::Other => ExtractResult::failure("no extractor for this file type"),
    }
}

/// Render table rows as pipe-delimited lines, the shared shape for DOCX and
/// PPTX tables.
pub(crate) fn rows_to_pipe_table(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|cells| cells.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_type_reports_an_error_instead_of_panicking() {
        let result = extract(Path::new("/nonexistent/file.bin"), FileType::Other, &ExcelLimits::default());
        assert!(result.error.is_some());
        assert!(result.text.is_empty());
    }

    #[test]
    fn missing_file_is_an_error_result() {
        let result = extract(Path::new("/nonexistent/file.txt"), FileType::Text, &ExcelLimits::default());
        assert!(result.error.is_some());
        assert!(!result.ok());
    }
}
