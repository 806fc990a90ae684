//! Plain-text and Markdown readers with a legacy-encoding fallback chain.

use std::path::Path;

use crate::section::Section;
use crate::ExtractResult;

/// Decode bytes as UTF-8, then EUC-KR (covers CP949 documents from Korean
/// Windows), then Windows-1252 as the lossy last resort.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let (decoded, _, had_errors) = encoding_rs::EUC_KR.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    decoded.into_owned()
}

fn read_to_string(path: &Path) -> Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("failed to read file: {e}"))?;
    let mut text = decode_text(&bytes);
    if text.contains('\r') {
        text = text.replace("\r\n", "\n").replace('\r', "\n");
    }
    Ok(text)
}

/// A `.txt` file is one unstructured blob; paragraph splitting happens in the
/// chunker.
pub fn extract_plain(path: &Path) -> ExtractResult {
    let text = match read_to_string(path) {
        Ok(t) => t,
        Err(e) => return ExtractResult::failure(e),
    };

    let sections = vec![Section::paragraph(text.clone())];
    ExtractResult { text, sections, ..Default::default() }
}

/// Markdown keeps its heading hierarchy so the chunker can build header
/// paths. ATX headings only; underline-style headings read as paragraphs.
pub fn extract_markdown(path: &Path) -> ExtractResult {
    let text = match read_to_string(path) {
        Ok(t) => t,
        Err(e) => return ExtractResult::failure(e),
    };

    let mut sections: Vec<Section> = Vec::new();
    let mut body: Vec<&str> = Vec::new();

    let flush = |body: &mut Vec<&str>, sections: &mut Vec<Section>| {
        let joined = body.join("\n");
        if !joined.trim().is_empty() {
            sections.push(Section::paragraph(joined));
        }
        body.clear();
    };

    for line in text.lines() {
        if let Some((level, title)) = parse_atx_heading(line) {
            flush(&mut body, &mut sections);
            sections.push(Section::heading(level, title));
        } else {
            body.push(line);
        }
    }
    flush(&mut body, &mut sections);

    ExtractResult { text, sections, ..Default::default() }
}

fn parse_atx_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        return None;
    }
    Some((hashes as u8, title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionKind;
    use std::io::Write;

    fn write_temp(bytes: &[u8], ext: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(ext).tempfile().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn plain_text_is_one_blob() {
        let f = write_temp("hello\n\nworld".as_bytes(), ".txt");
        let result = extract_plain(f.path());
        assert!(result.ok());
        assert_eq!(result.sections.len(), 1);
        assert_eq!(result.sections[0].kind, SectionKind::Paragraph);
    }

    #[test]
    fn euc_kr_bytes_decode_without_replacement() {
        // "budget" in Korean (예산), EUC-KR encoded.
        let bytes = [0xBF, 0xB9, 0xBB, 0xEA];
        let decoded = decode_text(&bytes);
        assert_eq!(decoded, "예산");
    }

    #[test]
    fn markdown_headings_become_heading_sections() {
        let f = write_temp("# Title\n\nintro text\n\n## Sub\n\nbody".as_bytes(), ".md");
        let result = extract_markdown(f.path());
        let headings: Vec<_> = result
            .sections
            .iter()
            .filter(|s| s.kind == SectionKind::Heading)
            .collect();
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].level, Some(1));
        assert_eq!(headings[0].title.as_deref(), Some("Title"));
        assert_eq!(headings[1].level, Some(2));
    }

    #[test]
    fn hash_without_space_is_not_a_heading() {
        assert!(parse_atx_heading("#tag").is_none());
        assert!(parse_atx_heading("####### too deep").is_none());
        assert_eq!(parse_atx_heading("## Closing ##"), Some((2, "Closing")));
    }
}
