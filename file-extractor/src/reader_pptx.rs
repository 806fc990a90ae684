//! PPTX reader: one section per slide, title placeholder detection, tables
//! flattened into the slide text.
//!
//! Slide order comes from `presentation.xml`'s `sldIdLst` resolved through
//! the presentation relationships, never from the part filenames: the
//! editor renames nothing when slides are reordered, so `slideN.xml`
//! numbering and the authored order diverge on any deck with edit history.

use std::collections::HashMap;
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

    let rels_xml = match ooxml::read_entry(&mut archive, "ppt/_rels/presentation.xml.rels") {
        Ok(x) => x,
        Err(e) => return ExtractResult::failure(e),
    };
    let pres_xml = match ooxml::read_entry(&mut archive, "ppt/presentation.xml") {
        Ok(x) => x,
        Err(e) => return ExtractResult::failure(e),
    };

    let targets = slide_targets(&pres_xml, &relationship_targets(&rels_xml));
    if targets.is_empty() {
        return ExtractResult::failure("presentation lists no slides");
    }

    let mut sections: Vec<Section> = Vec::new();
    for (slide_index, name) in targets.iter().enumerate() {
        // Numbering follows the authored order, not the part filename.
        let slide_no = (slide_index as u32) + 1;
        let xml = match ooxml::read_entry(&mut archive, name) {
            Ok(x) => x,
            Err(_) => continue,
        };
        let (title, text) = parse_slide_xml(&xml);
        if text.trim().is_empty() {
            continue;
        }
        let mut section = Section::new(SectionKind::Slide, text).with_slide(slide_no);
        section.title = title;
        sections.push(section);
    }

    let text = sections
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let metadata = ooxml::core_properties(&mut archive);
    ExtractResult { text, sections, metadata, ..Default::default() }
}

/// Walk one slide: collect paragraph text per shape, detect the title
/// placeholder, flatten tables row by row.
fn parse_slide_xml(xml: &str) -> (Option<String>, String) {
    let mut reader = Reader::from_str(xml);

    let mut title: Option<String> = None;
    let mut paragraphs: Vec<String> = Vec::new();

    let mut in_shape = false;
    let mut shape_is_title = false;
    let mut shape_start = 0usize;

    let mut paragraph = String::new();
    let mut in_text = false;

    let mut table_depth = 0usize;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(e) => e,
            Err(_) => break,
        };
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sp" => {
                    in_shape = true;
                    shape_is_title = false;
                    shape_start = paragraphs.len();
                }
                b"ph" if in_shape => {
                    if placeholder_is_title(&e) {
                        shape_is_title = true;
                    }
                }
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            // <p:ph type="title"/> is usually self-closing.
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"ph" && in_shape && placeholder_is_title(&e) {
                    shape_is_title = true;
                }
            }
            Event::Text(t) => {
                if in_text {
                    let piece = t.unescape().unwrap_or_default();
                    if table_depth > 0 {
                        cell.push_str(&piece);
                    } else {
                        paragraph.push_str(&piece);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if table_depth == 0 {
                        let text = paragraph.trim();
                        if !text.is_empty() {
                            paragraphs.push(text.to_string());
                        }
                        paragraph.clear();
                    } else if !cell.is_empty() && !cell.ends_with(' ') {
                        cell.push(' ');
                    }
                }
                b"tc" if table_depth == 1 => row.push(cell.trim().to_string()),
                b"tr" if table_depth == 1 => {
                    if row.iter().any(|c| !c.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        paragraphs.push(rows_to_pipe_table(&rows));
                        rows.clear();
                    }
                }
                b"sp" => {
                    if shape_is_title && title.is_none() {
                        let text = paragraphs[shape_start..].join(" ");
                        if !text.trim().is_empty() {
                            title = Some(text.trim().to_string());
                        }
                    }
                    in_shape = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    (title, paragraphs.join("\n"))
}

/// rId -> package part from `ppt/_rels/presentation.xml.rels`. Targets are
/// stored relative to `ppt/`.
fn relationship_targets(xml: &str) -> HashMap<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut map = HashMap::new();
    loop {
        let event = match reader.read_event() {
            Ok(e) => e,
            Err(_) => break,
        };
        match event {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut target = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"Id" => id = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                            b"Target" => {
                                target = Some(String::from_utf8_lossy(&attr.value).into_owned())
                            }
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(target)) = (id, target) {
                        let target = target.trim_start_matches('/');
                        let part = if target.starts_with("ppt/") {
                            target.to_string()
                        } else {
                            format!("ppt/{target}")
                        };
                        map.insert(id, part);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    map
}

/// Slide parts in authored order: walk `sldIdLst`'s `sldId` entries and
/// resolve each `r:id` through the relationship map. The numeric `id`
/// attribute is a stable identifier, not an ordering key.
fn slide_targets(xml: &str, rels: &HashMap<String, String>) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut targets = Vec::new();
    loop {
        let event = match reader.read_event() {
            Ok(e) => e,
            Err(_) => break,
        };
        match event {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() == b"sldId" {
                    let rid = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"r:id")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    if let Some(part) = rid.and_then(|rid| rels.get(&rid)) {
                        targets.push(part.clone());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    targets
}

fn placeholder_is_title(e: &quick_xml::events::BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"type")
        .map(|a| {
            let value = String::from_utf8_lossy(&a.value).into_owned();
            value == "title" || value == "ctrTitle"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = r#"<?xml version="1.0"?>
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"
       xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
  <p:cSld><p:spTree>
    <p:sp>
      <p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
      <p:txBody><a:p><a:r><a:t>Roadmap 2025</a:t></a:r></a:p></p:txBody>
    </p:sp>
    <p:sp>
      <p:nvSpPr><p:nvPr><p:ph type="body"/></p:nvPr></p:nvSpPr>
      <p:txBody><a:p><a:r><a:t>First milestone</a:t></a:r></a:p><a:p><a:r><a:t>Second milestone</a:t></a:r></a:p></p:txBody>
    </p:sp>
  </p:spTree></p:cSld>
</p:sld>"#;

    #[test]
    fn title_placeholder_and_body_text_are_captured() {
        let (title, text) = parse_slide_xml(SLIDE);
        assert_eq!(title.as_deref(), Some("Roadmap 2025"));
        assert!(text.contains("Roadmap 2025"));
        assert!(text.contains("First milestone"));
        assert!(text.contains("Second milestone"));
    }

    #[test]
    fn tables_are_flattened_into_rows() {
        let xml = r#"<p:sld xmlns:p="p" xmlns:a="a"><a:tbl>
            <a:tr><a:tc><a:txBody><a:p><a:r><a:t>H1</a:t></a:r></a:p></a:txBody></a:tc>
                  <a:tc><a:txBody><a:p><a:r><a:t>H2</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
        </a:tbl></p:sld>"#;
        let (_, text) = parse_slide_xml(xml);
        assert_eq!(text, "H1 | H2");
    }

    const RELS: &str = r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml"/>
</Relationships>"#;

    // sldIdLst puts slide2.xml first: the authored order contradicts the
    // part-name numbering, as it does after any reorder in the editor.
    const PRESENTATION: &str = r#"<?xml version="1.0"?>
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"
                xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <p:sldIdLst>
    <p:sldId id="257" r:id="rId2"/>
    <p:sldId id="256" r:id="rId1"/>
  </p:sldIdLst>
</p:presentation>"#;

    fn slide_xml(text: &str) -> String {
        format!(
            r#"<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"
                    xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
  <p:cSld><p:spTree><p:sp>
    <p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody>
  </p:sp></p:spTree></p:cSld>
</p:sld>"#
        )
    }

    fn write_package(parts: &[(&str, &str)]) -> tempfile::NamedTempFile {
        use std::io::Write;

        let file = tempfile::Builder::new().suffix(".pptx").tempfile().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        let options = zip::write::FileOptions::default();
        for (name, content) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn relationship_targets_are_resolved_relative_to_ppt() {
        let rels = relationship_targets(RELS);
        assert_eq!(rels.get("rId1").unwrap(), "ppt/slides/slide1.xml");
        assert_eq!(rels.get("rId2").unwrap(), "ppt/slides/slide2.xml");
    }

    #[test]
    fn slide_targets_follow_sld_id_lst_order() {
        let targets = slide_targets(PRESENTATION, &relationship_targets(RELS));
        assert_eq!(targets, vec!["ppt/slides/slide2.xml", "ppt/slides/slide1.xml"]);
    }

    #[test]
    fn authored_order_wins_over_part_name_order() {
        let first = slide_xml("Opening remarks");
        let second = slide_xml("Closing remarks");
        // slide1.xml holds the slide that was moved to the end of the deck.
        let package = write_package(&[
            ("ppt/_rels/presentation.xml.rels", RELS),
            ("ppt/presentation.xml", PRESENTATION),
            ("ppt/slides/slide1.xml", second.as_str()),
            ("ppt/slides/slide2.xml", first.as_str()),
        ]);

        let result = extract(package.path());
        assert!(result.ok(), "{:?}", result.error);
        assert_eq!(result.sections.len(), 2);
        assert!(result.sections[0].text.contains("Opening remarks"));
        assert_eq!(result.sections[0].slide, Some(1));
        assert!(result.sections[1].text.contains("Closing remarks"));
        assert_eq!(result.sections[1].slide, Some(2));
    }

    #[test]
    fn missing_relationships_part_is_a_parse_error() {
        let package = write_package(&[("ppt/presentation.xml", PRESENTATION)]);
        let result = extract(package.path());
        assert!(result.error.is_some());
    }
}
