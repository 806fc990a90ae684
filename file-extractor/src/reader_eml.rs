//! RFC 822 email reader for `.eml` files.
//!
//! `.msg` is a compound binary container that needs the mail client interop
//! owned by the connector layer, so it reports a Parse error here.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine as _;

use crate::reader_text::decode_text;
use crate::section::Section;
use crate::ExtractResult;

pub fn extract(path: &Path) -> ExtractResult {
    let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase());
    if ext.as_deref() == Some("msg") {
        return ExtractResult::failure("Outlook .msg requires the mail connector");
    }

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => return ExtractResult::failure(format!("failed to read file: {e}")),
    };
    let raw = decode_text(&bytes).replace("\r\n", "\n");

    let (header_block, body_block) = match raw.split_once("\n\n") {
        Some((h, b)) => (h, b),
        None => (raw.as_str(), ""),
    };

    let headers = parse_headers(header_block);
    let subject = headers.get("subject").map(|s| decode_encoded_words(s));
    let sender = headers.get("from").map(|s| decode_encoded_words(s));
    let date = headers.get("date").cloned();

    let body = extract_body(
        body_block,
        headers.get("content-type").map(String::as_str),
        headers.get("content-transfer-encoding").map(String::as_str),
    );

    let mut text = String::new();
    if let Some(s) = &subject {
        text.push_str(s);
        text.push_str("\n\n");
    }
    text.push_str(body.trim());

    if text.trim().is_empty() {
        return ExtractResult::failure("email has no readable text body");
    }

    let mut metadata = finder_model::DocMetadata::new();
    if let Some(s) = subject {
        metadata.insert("subject".into(), s);
    }
    if let Some(s) = sender {
        metadata.insert("sender".into(), s.clone());
        metadata.insert("author".into(), s);
    }
    if let Some(d) = date {
        metadata.insert("date".into(), d);
    }

    let sections = vec![Section::paragraph(text.clone())];
    ExtractResult { text, sections, metadata, ..Default::default() }
}

/// Lowercased header map with RFC 822 continuation lines unfolded.
fn parse_headers(block: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in block.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name, value);
    }
    headers
}

/// Pick the text/plain payload out of a possibly multipart body and undo its
/// transfer encoding.
fn extract_body(body: &str, content_type: Option<&str>, transfer_encoding: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if ct.to_lowercase().contains("multipart/") {
            if let Some(boundary) = boundary_from_content_type(ct) {
                for part in body.split(&format!("--{boundary}")) {
                    let part = part.trim_start_matches('\n');
                    let (part_headers, part_body) = match part.split_once("\n\n") {
                        Some((h, b)) => (parse_headers(h), b),
                        None => continue,
                    };
                    let part_type = part_headers.get("content-type").map(String::as_str).unwrap_or("text/plain");
                    if part_type.to_lowercase().contains("text/plain") {
                        return decode_transfer(
                            part_body,
                            part_headers.get("content-transfer-encoding").map(String::as_str),
                        );
                    }
                }
                return String::new();
            }
        }
        if !ct.to_lowercase().contains("text/") {
            return String::new();
        }
    }
    decode_transfer(body, transfer_encoding)
}

fn boundary_from_content_type(ct: &str) -> Option<String> {
    let lower = ct.to_lowercase();
    let idx = lower.find("boundary=")?;
    let rest = &ct[idx + "boundary=".len()..];
    let value = rest.split(';').next().unwrap_or(rest).trim();
    Some(value.trim_matches('"').to_string())
}

fn decode_transfer(body: &str, encoding: Option<&str>) -> String {
    match encoding.map(|e| e.trim().to_lowercase()).as_deref() {
        Some("base64") => {
            let packed: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            match base64::engine::general_purpose::STANDARD.decode(packed) {
                Ok(bytes) => decode_text(&bytes),
                Err(_) => body.to_string(),
            }
        }
        Some("quoted-printable") => decode_quoted_printable(body),
        _ => body.to_string(),
    }
}

fn decode_quoted_printable(body: &str) -> String {
    let mut out: Vec<u8> = Vec::with_capacity(body.len());
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            // Soft line break.
            if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                i += 2;
                continue;
            }
            if i + 2 < bytes.len() {
                if let Ok(value) = u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""),
                    16,
                ) {
                    out.push(value);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    decode_text(&out)
}

/// Decode RFC 2047 encoded-words in Subject/From headers, best-effort.
fn decode_encoded_words(value: &str) -> String {
    let mut out = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("=?") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("?=") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let word = &after[..end];
        let mut parts = word.splitn(3, '?');
        let decoded = match (parts.next(), parts.next(), parts.next()) {
            (Some(_charset), Some(enc), Some(payload)) => match enc.to_ascii_lowercase().as_str() {
                "b" => base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .map(|b| decode_text(&b))
                    .ok(),
                "q" => Some(decode_quoted_printable(&payload.replace('_', " "))),
                _ => None,
            },
            _ => None,
        };
        match decoded {
            Some(d) => out.push_str(&d),
            None => {
                out.push_str("=?");
                out.push_str(word);
                out.push_str("?=");
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_eml_extracts_subject_and_body() {
        let raw = "From: alice@example.com\nSubject: Q4 budget\nDate: Mon, 1 Jan 2024 10:00:00 +0000\n\nPlease review the attached budget plan.\n";
        let mut f = tempfile::Builder::new().suffix(".eml").tempfile().unwrap();
        f.write_all(raw.as_bytes()).unwrap();

        let result = extract(f.path());
        assert!(result.ok(), "{:?}", result.error);
        assert!(result.text.contains("Q4 budget"));
        assert!(result.text.contains("Please review"));
        assert_eq!(result.metadata.get("subject").unwrap(), "Q4 budget");
        assert_eq!(result.metadata.get("sender").unwrap(), "alice@example.com");
    }

    #[test]
    fn msg_reports_parse_error() {
        let mut f = tempfile::Builder::new().suffix(".msg").tempfile().unwrap();
        f.write_all(b"\xd0\xcf\x11\xe0").unwrap();
        let result = extract(f.path());
        assert!(result.error.is_some());
    }

    #[test]
    fn multipart_takes_the_text_plain_part() {
        let body = "preamble\n--XYZ\nContent-Type: text/html\n\n<b>html</b>\n--XYZ\nContent-Type: text/plain\n\nplain body here\n--XYZ--\n";
        let out = extract_body(body, Some(r#"multipart/alternative; boundary="XYZ""#), None);
        assert!(out.contains("plain body here"));
        assert!(!out.contains("<b>"));
    }

    #[test]
    fn quoted_printable_decodes() {
        assert_eq!(decode_quoted_printable("caf=C3=A9"), "café");
    }

    #[test]
    fn encoded_word_subject_decodes() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?aGVsbG8=?="), "hello");
        assert_eq!(decode_encoded_words("=?UTF-8?Q?bud=20get?="), "bud get");
    }
}
