//! XLSX reader built on calamine. Each worksheet becomes one sheet section
//! rendered as a Markdown table, capped at `max_rows` x `max_cols`.

use std::path::Path;

use calamine::Reader;
use finder_model::config::ExcelLimits;
use finder_model::DocMetadata;

use crate::section::{Section, SectionKind};
use crate::ExtractResult;

pub fn extract(path: &Path, limits: &ExcelLimits) -> ExtractResult {
    let mut workbook = match calamine::open_workbook_auto(path) {
        Ok(wb) => wb,
        Err(e) => return ExtractResult::failure(format!("failed to open workbook: {e}")),
    };

    let names: Vec<String> = workbook.sheet_names();
    if names.is_empty() {
        return ExtractResult::failure("workbook has no sheets");
    }

    let mut sections: Vec<Section> = Vec::new();
    let mut text_parts: Vec<String> = Vec::new();

    for name in &names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            _ => continue,
        };

        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in range.rows().take(limits.max_rows) {
            let mut cells: Vec<String> =
                row.iter().take(limits.max_cols).map(cell_to_string).collect();
            while matches!(cells.last(), Some(last) if last.trim().is_empty()) {
                cells.pop();
            }
            if cells.iter().any(|c| !c.trim().is_empty()) {
                rows.push(cells);
            }
        }

        if rows.is_empty() {
            continue;
        }

        let row_count = rows.len() as u32;
        let rendered = render_markdown_table(&rows);

        let mut section = Section::new(SectionKind::Sheet, rendered.clone());
        section.sheet = Some(name.clone());
        section.row_range = Some((1, row_count));
        sections.push(section);

        text_parts.push(format!("## Sheet: {name}\n{rendered}"));
    }

    if sections.is_empty() {
        return ExtractResult::failure("workbook contains no data");
    }

    let mut metadata = DocMetadata::new();
    metadata.insert("sheet_count".into(), names.len().to_string());

    ExtractResult { text: text_parts.join("\n\n"), sections, metadata, ..Default::default() }
}

/// First row is treated as the header, the rest padded or truncated to its
/// width.
fn render_markdown_table(rows: &[Vec<String>]) -> String {
    let header = &rows[0];
    let width = header.len().max(1);

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!("| {} |", header.join(" | ")));
    lines.push(format!("| {} |", vec!["---"; width].join(" | ")));

    for row in &rows[1..] {
        let mut cells = row.clone();
        cells.resize(width, String::new());
        lines.push(format!("| {} |", cells.join(" | ")));
    }

    lines.join("\n")
}

fn cell_to_string(c: &calamine::DataType) -> String {
    use calamine::DataType as D;
    match c {
        D::Empty => String::new(),
        D::String(s) => s.replace("\r\n", " ").replace(['\r', '\n'], " ").trim().to_string(),
        D::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        D::Int(i) => i.to_string(),
        D::Bool(b) => if *b { "TRUE".into() } else { "FALSE".into() },
        D::Error(e) => format!("#ERR:{e:?}"),
        other => format!("{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_table_pads_short_rows() {
        let rows = vec![
            vec!["Item".into(), "Cost".into()],
            vec!["Ads".into()],
        ];
        let rendered = render_markdown_table(&rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "| Item | Cost |");
        assert_eq!(lines[1], "| --- | --- |");
        assert_eq!(lines[2], "| Ads |  |");
    }

    #[test]
    fn floats_without_fraction_render_as_integers() {
        assert_eq!(cell_to_string(&calamine::DataType::Float(42.0)), "42");
        assert_eq!(cell_to_string(&calamine::DataType::Float(1.5)), "1.5");
    }
}
