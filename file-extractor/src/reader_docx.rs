//! DOCX reader: paragraphs, heading styles and tables from
//! `word/document.xml`.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::ooxml;
use crate::section::{Section, SectionKind};
use crate::{rows_to_pipe_table, ExtractResult};

pub fn extract(path: &Path) -> ExtractResult {
    let mut archive = match ooxml::open_archive(path) {
        Ok(a) => a,
        Err(e) => return ExtractResult::failure(e),
    };

    let xml = match ooxml::read_entry(&mut archive, "word/document.xml") {
        Ok(x) => x,
        Err(e) => return ExtractResult::failure(e),
    };

    let sections = parse_document_xml(&xml);
    let text = sections
        .iter()
        .map(|s| s.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let metadata = ooxml::core_properties(&mut archive);
    ExtractResult { text, sections, metadata, ..Default::default() }
}

fn parse_document_xml(xml: &str) -> Vec<Section> {
    let mut reader = Reader::from_str(xml);

    let mut sections: Vec<Section> = Vec::new();

    // Paragraph state (outside tables).
    let mut in_paragraph = false;
    let mut paragraph_text = String::new();
    let mut heading_level: Option<u8> = None;

    // Table state. Nested tables are flattened into the outer one.
    let mut table_depth = 0usize;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_text = String::new();

    let mut in_text_run = false;

    loop {
        let event = match reader.read_event() {
            Ok(e) => e,
            Err(_) => break,
        };
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell_text.clear(),
                b"p" if table_depth == 0 => {
                    in_paragraph = true;
                    paragraph_text.clear();
                    heading_level = None;
                }
                // Some producers write pStyle as a start/end pair.
                b"pStyle" if in_paragraph => {
                    if let Some(val) = attr_value(&e, b"val") {
                        heading_level = heading_level_from_style(&val);
                    }
                }
                b"t" => in_text_run = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"pStyle" if in_paragraph => {
                    if let Some(val) = attr_value(&e, b"val") {
                        heading_level = heading_level_from_style(&val);
                    }
                }
                b"tab" => {
                    if table_depth > 0 {
                        cell_text.push(' ');
                    } else if in_paragraph {
                        paragraph_text.push(' ');
                    }
                }
                b"br" => {
                    if table_depth > 0 {
                        cell_text.push(' ');
                    } else if in_paragraph {
                        paragraph_text.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if in_text_run {
                    let piece = t.unescape().unwrap_or_default();
                    if table_depth > 0 {
                        cell_text.push_str(&piece);
                    } else if in_paragraph {
                        paragraph_text.push_str(&piece);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" if table_depth == 0 => {
                    in_paragraph = false;
                    let text = paragraph_text.trim();
                    if !text.is_empty() {
                        match heading_level {
                            Some(level) => sections.push(Section::heading(level, text)),
                            None => sections.push(Section::paragraph(text)),
                        }
                    }
                }
                b"p" if table_depth > 0 => {
                    // Paragraph break inside a cell.
                    if !cell_text.is_empty() && !cell_text.ends_with(' ') {
                        cell_text.push(' ');
                    }
                }
                b"tc" if table_depth == 1 => row.push(cell_text.trim().to_string()),
                b"tr" if table_depth == 1 => {
                    if row.iter().any(|c| !c.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        let rendered = rows_to_pipe_table(&rows);
                        sections.push(Section::new(SectionKind::Table, rendered));
                        rows.clear();
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    sections
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, local: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == local {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// "Heading1".."Heading6" (and localized variants keeping the digit) map to
/// levels 1..=6.
fn heading_level_from_style(style: &str) -> Option<u8> {
    let lower = style.to_lowercase();
    if !lower.starts_with("heading") {
        return None;
    }
    let digits: String = style.chars().filter(|c| c.is_ascii_digit()).collect();
    let level = digits.parse::<u8>().unwrap_or(1);
    Some(level.clamp(1, 6))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Overview</w:t></w:r></w:p>
    <w:p><w:r><w:t>Quarterly </w:t></w:r><w:r><w:t>budget plan.</w:t></w:r></w:p>
    <w:tbl>
      <w:tr><w:tc><w:p><w:r><w:t>Item</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Cost</w:t></w:r></w:p></w:tc></w:tr>
      <w:tr><w:tc><w:p><w:r><w:t>Ads</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>100</w:t></w:r></w:p></w:tc></w:tr>
    </w:tbl>
  </w:body>
</w:document>"#;

    #[test]
    fn headings_paragraphs_and_tables_come_out_in_order() {
        let sections = parse_document_xml(SAMPLE);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].kind, SectionKind::Heading);
        assert_eq!(sections[0].level, Some(1));
        assert_eq!(sections[0].title.as_deref(), Some("Overview"));
        assert_eq!(sections[1].kind, SectionKind::Paragraph);
        assert_eq!(sections[1].text, "Quarterly budget plan.");
        assert_eq!(sections[2].kind, SectionKind::Table);
        assert_eq!(sections[2].text, "Item | Cost\nAds | 100");
    }

    #[test]
    fn heading_styles_parse_levels() {
        assert_eq!(heading_level_from_style("Heading1"), Some(1));
        assert_eq!(heading_level_from_style("Heading3"), Some(3));
        assert_eq!(heading_level_from_style("heading9"), Some(6));
        assert_eq!(heading_level_from_style("BodyText"), None);
    }
}
