//! File-type-aware chunking with location metadata.
//!
//! Every strategy funnels through [`split_text`], which cuts on paragraph
//! breaks when it can, sentence ends when it must, and hard character
//! windows as the last resort.

use finder_model::config::ChunkParams;
use finder_model::ChunkLocation;

use crate::classifier::FileType;
use crate::section::{Section, SectionKind};
use crate::ExtractResult;

/// A chunk before ids and embeddings are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Dense 0-based position within the file, across all sections.
    pub chunk_index: u32,
    pub text: String,
    pub location: ChunkLocation,
}

/// Turn an extraction result into ordered chunks using the strategy for the
/// file type.
pub fn chunk_extract(result: &ExtractResult, file_type: FileType, params: &ChunkParams) -> Vec<Chunk> {
    let pieces = match file_type {
        FileType::Pdf => page_based(&result.sections, params),
        FileType::PowerPoint => slide_based(&result.sections),
        FileType::Excel => sheet_based(&result.sections, params),
        FileType::Word | FileType::Markdown => heading_based(&result.sections, params),
        FileType::Email => email_chunks(result, params),
        FileType::Text | FileType::Other => split_text(&result.text, params)
            .into_iter()
            .map(|text| (text, ChunkLocation::default()))
            .collect(),
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (text, location))| Chunk { chunk_index: i as u32, text, location })
        .collect()
}

fn page_based(sections: &[Section], params: &ChunkParams) -> Vec<(String, ChunkLocation)> {
    let mut out = Vec::new();
    for section in sections.iter().filter(|s| s.kind == SectionKind::Page) {
        for text in split_text(&section.text, params) {
            let location = ChunkLocation { page: section.page, ..Default::default() };
            out.push((text, location));
        }
    }
    out
}

/// Slides are short; each one is a single chunk.
fn slide_based(sections: &[Section]) -> Vec<(String, ChunkLocation)> {
    sections
        .iter()
        .filter(|s| s.kind == SectionKind::Slide && !s.text.trim().is_empty())
        .map(|section| {
            let location = ChunkLocation {
                slide: section.slide,
                slide_title: section.title.clone(),
                ..Default::default()
            };
            (section.text.trim().to_string(), location)
        })
        .collect()
}

fn sheet_based(sections: &[Section], params: &ChunkParams) -> Vec<(String, ChunkLocation)> {
    let mut out = Vec::new();
    for section in sections.iter().filter(|s| s.kind == SectionKind::Sheet) {
        if section.text.chars().count() <= params.chunk_size {
            let location = ChunkLocation {
                sheet: section.sheet.clone(),
                row_range: section.row_range,
                ..Default::default()
            };
            out.push((section.text.trim().to_string(), location));
        } else {
            // Row range of a partial sheet is unknown after splitting.
            for text in split_text(&section.text, params) {
                let location = ChunkLocation { sheet: section.sheet.clone(), ..Default::default() };
                out.push((text, location));
            }
        }
    }
    out
}

/// Walk sections keeping a mutable header-path stack: a heading at level L
/// pops the stack down to depth L-1 and pushes its title. Content between
/// headings is split generically and tagged with the stack snapshot.
fn heading_based(sections: &[Section], params: &ChunkParams) -> Vec<(String, ChunkLocation)> {
    let mut out = Vec::new();
    let mut stack: Vec<(u8, String)> = Vec::new();
    let mut buffer = String::new();

    let flush = |buffer: &mut String, stack: &[(u8, String)], out: &mut Vec<(String, ChunkLocation)>| {
        let header_path: Vec<String> = stack.iter().map(|(_, t)| t.clone()).collect();
        for text in split_text(buffer, params) {
            let location = ChunkLocation { header_path: header_path.clone(), ..Default::default() };
            out.push((text, location));
        }
        buffer.clear();
    };

    for section in sections {
        match section.kind {
            SectionKind::Heading => {
                flush(&mut buffer, &stack, &mut out);
                let level = section.level.unwrap_or(1);
                while matches!(stack.last(), Some((l, _)) if *l >= level) {
                    stack.pop();
                }
                let title = section.title.clone().unwrap_or_else(|| section.text.clone());
                stack.push((level, title.clone()));
                // Keep the heading text searchable with its own content.
                buffer.push_str(&title);
                buffer.push('\n');
            }
            _ => {
                if !section.text.trim().is_empty() {
                    buffer.push_str(&section.text);
                    buffer.push_str("\n\n");
                }
            }
        }
    }
    flush(&mut buffer, &stack, &mut out);
    out
}

fn email_chunks(result: &ExtractResult, params: &ChunkParams) -> Vec<(String, ChunkLocation)> {
    let location = ChunkLocation {
        subject: result.metadata.get("subject").cloned(),
        sender: result.metadata.get("sender").cloned(),
        date: result.metadata.get("date").cloned(),
        ..Default::default()
    };
    split_text(&result.text, params)
        .into_iter()
        .map(|text| (text, location.clone()))
        .collect()
}

/// Generic character-window splitter.
///
/// Targets `chunk_size` characters with `chunk_overlap` carried between
/// consecutive windows. When the window end falls mid-text, the cut point is
/// the last paragraph break in the second half of the window, else the last
/// sentence terminator there, else the hard window boundary.
pub fn split_text(text: &str, params: &ChunkParams) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let size = params.chunk_size.max(1);
    let overlap = params.chunk_overlap.min(size / 2);

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < n {
        let end = (start + size).min(n);
        let mut cut = end;
        if end < n {
            let half = start + (end - start) / 2;
            if let Some(p) = last_paragraph_break(&chars, half, end) {
                cut = p;
            } else if let Some(p) = last_sentence_end(&chars, half, end) {
                cut = p;
            }
        }

        let segment: String = chars[start..cut].iter().collect();
        let segment = segment.trim();
        if !segment.is_empty() {
            out.push(segment.to_string());
        }

        if cut >= n {
            break;
        }
        start = cut.saturating_sub(overlap).max(start + 1);
    }
    out
}

/// Cut position just after the last blank line in `[from, to)`.
fn last_paragraph_break(chars: &[char], from: usize, to: usize) -> Option<usize> {
    let mut i = to;
    while i > from.max(1) {
        i -= 1;
        if chars[i] == '\n' && chars[i - 1] == '\n' {
            return Some(i + 1);
        }
    }
    None
}

const SENTENCE_ENDS: [char; 4] = ['.', '!', '?', '。'];

/// Cut position just after the last sentence terminator in `[from, to)`.
fn last_sentence_end(chars: &[char], from: usize, to: usize) -> Option<usize> {
    let mut i = to;
    while i > from {
        i -= 1;
        if SENTENCE_ENDS.contains(&chars[i]) {
            return Some(i + 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize, overlap: usize) -> ChunkParams {
        ChunkParams { chunk_size: size, chunk_overlap: overlap }
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_text("hello world", &params(1000, 100));
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(split_text("   \n\n  ", &params(1000, 100)).is_empty());
    }

    #[test]
    fn splitter_prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split_text(&text, &params(80, 10));
        assert_eq!(chunks[0], "a".repeat(60));
        // Overlap reaches back across the break; the tail is the b-paragraph.
        assert!(chunks[1].ends_with('b'));
    }

    #[test]
    fn splitter_falls_back_to_sentence_ends() {
        let text = format!("{}. {}", "a".repeat(60), "b".repeat(60));
        let chunks = split_text(&text, &params(80, 0));
        assert_eq!(chunks[0], format!("{}.", "a".repeat(60)));
    }

    #[test]
    fn splitter_hard_cuts_unbroken_text() {
        let text = "x".repeat(250);
        let chunks = split_text(&text, &params(100, 10));
        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].chars().count(), 100);
    }

    #[test]
    fn overlap_repeats_tail_of_previous_window() {
        let text = "x".repeat(150);
        let chunks = split_text(&text, &params(100, 20));
        assert_eq!(chunks[0].chars().count(), 100);
        // Second window starts 20 chars before the first cut.
        assert_eq!(chunks[1].chars().count(), 70);
    }

    #[test]
    fn heading_stack_builds_header_paths() {
        let sections = vec![
            Section::heading(1, "Intro"),
            Section::paragraph("intro text"),
            Section::heading(2, "Scope"),
            Section::paragraph("scope text"),
            Section::heading(1, "Design"),
            Section::paragraph("design text"),
        ];
        let chunks = heading_based(&sections, &params(1000, 100));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].1.header_path, vec!["Intro"]);
        assert_eq!(chunks[1].1.header_path, vec!["Intro", "Scope"]);
        assert_eq!(chunks[2].1.header_path, vec!["Design"]);
        assert!(chunks[2].0.contains("design text"));
    }

    #[test]
    fn slides_are_one_chunk_each() {
        let mut s1 = Section::new(SectionKind::Slide, "alpha").with_slide(1);
        s1.title = Some("Alpha".into());
        let s2 = Section::new(SectionKind::Slide, "beta").with_slide(2);
        let result = ExtractResult {
            text: "alpha\n\nbeta".into(),
            sections: vec![s1, s2],
            ..Default::default()
        };
        let chunks = chunk_extract(&result, FileType::PowerPoint, &params(1000, 100));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].location.slide, Some(1));
        assert_eq!(chunks[0].location.slide_title.as_deref(), Some("Alpha"));
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[test]
    fn sheet_that_fits_keeps_row_range() {
        let mut sheet = Section::new(SectionKind::Sheet, "| a | b |");
        sheet.sheet = Some("Sales".into());
        sheet.row_range = Some((1, 1));
        let result = ExtractResult { text: String::new(), sections: vec![sheet], ..Default::default() };
        let chunks = chunk_extract(&result, FileType::Excel, &params(1000, 100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].location.sheet.as_deref(), Some("Sales"));
        assert_eq!(chunks[0].location.row_range, Some((1, 1)));
    }

    #[test]
    fn chunk_indices_are_dense_across_pages() {
        let sections = vec![
            Section::new(SectionKind::Page, "one. two. three.").with_page(1),
            Section::new(SectionKind::Page, "four. five.").with_page(2),
        ];
        let result = ExtractResult { text: String::new(), sections, ..Default::default() };
        let chunks = chunk_extract(&result, FileType::Pdf, &params(1000, 100));
        let indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, (0..chunks.len() as u32).collect::<Vec<_>>());
        assert_eq!(chunks[0].location.page, Some(1));
        assert_eq!(chunks.last().unwrap().location.page, Some(2));
    }
}
