//! PDF reader built on lopdf. One page section per page; pages whose text
//! extraction fails are skipped and counted.

use std::path::Path;

use lopdf::{Document, Object};

use crate::section::{Section, SectionKind};
use crate::ExtractResult;

pub fn extract(path: &Path) -> ExtractResult {
    let doc = match Document::load(path) {
        Ok(d) => d,
        Err(e) => return ExtractResult::failure(format!("failed to load PDF: {e}")),
    };

    if doc.is_encrypted() {
        return ExtractResult::failure("PDF is encrypted");
    }

    let pages = doc.get_pages();
    let mut sections: Vec<Section> = Vec::new();
    let mut failed_pages = 0u32;

    for (&page_no, _) in pages.iter() {
        match doc.extract_text(&[page_no]) {
            Ok(raw) => {
                let text = raw.trim();
                if !text.is_empty() {
                    sections.push(
                        Section::new(SectionKind::Page, text).with_page(page_no),
                    );
                }
            }
            Err(err) => {
                tracing::debug!(page = page_no, "page text extraction failed: {err}");
                failed_pages += 1;
            }
        }
    }

    if sections.is_empty() {
        return ExtractResult {
            failed_pages,
            ..ExtractResult::failure("no extractable text in PDF")
        };
    }

    let text = sections
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let metadata = info_metadata(&doc);
    ExtractResult { text, sections, metadata, failed_pages, ..Default::default() }
}

/// Author/title from the PDF info dictionary, best-effort.
fn info_metadata(doc: &Document) -> finder_model::DocMetadata {
    let mut metadata = finder_model::DocMetadata::new();

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => return metadata,
        },
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => return metadata,
    };

    for (key, field) in [(b"Author".as_slice(), "author"), (b"Title".as_slice(), "title")] {
        if let Ok(Object::String(bytes, _)) = info.get(key) {
            let value = pdf_string(bytes);
            if !value.is_empty() {
                metadata.insert(field.to_string(), value);
            }
        }
    }
    metadata
}

/// PDF text strings are either UTF-16BE (BOM-prefixed) or PDFDocEncoding;
/// the latter is close enough to Latin-1 for name fields.
fn pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units).trim().to_string();
    }
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_pdf_strings_decode() {
        let bytes = [0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42];
        assert_eq!(pdf_string(&bytes), "AB");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = extract(Path::new("/nonexistent.pdf"));
        assert!(result.error.is_some());
    }
}
