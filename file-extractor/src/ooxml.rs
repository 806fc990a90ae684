//! Shared helpers for the zip+XML Office formats (DOCX, PPTX).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use finder_model::DocMetadata;
use quick_xml::events::Event;
use quick_xml::Reader;

pub(crate) type Archive = zip::ZipArchive<File>;

pub(crate) fn open_archive(path: &Path) -> Result<Archive, String> {
    let file = File::open(path).map_err(|e| format!("failed to open file: {e}"))?;
    zip::ZipArchive::new(file).map_err(|e| format!("not a valid Office package: {e}"))
}

pub(crate) fn read_entry(archive: &mut Archive, name: &str) -> Result<String, String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| format!("missing package part `{name}`: {e}"))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| format!("failed to read package part `{name}`: {e}"))?;
    Ok(xml)
}

/// Best-effort author/title from `docProps/core.xml`. Absence is normal.
pub(crate) fn core_properties(archive: &mut Archive) -> DocMetadata {
    let mut metadata = DocMetadata::new();
    let Ok(xml) = read_entry(archive, "docProps/core.xml") else {
        return metadata;
    };

    let mut reader = Reader::from_str(&xml);
    let mut field: Option<&'static str> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                field = match e.local_name().as_ref() {
                    b"creator" => Some("author"),
                    b"title" => Some("title"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                if let Some(key) = field {
                    let value = t.unescape().unwrap_or_default().trim().to_string();
                    if !value.is_empty() {
                        metadata.insert(key.to_string(), value);
                    }
                }
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    metadata
}
