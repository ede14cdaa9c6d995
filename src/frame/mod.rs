//! In-memory tabular results.
//!
//! A query result is pulled into local memory in one piece and is read-only
//! afterwards; `describe()` produces the per-column summary.

mod describe;
mod types;

pub use describe::{ColumnSummary, Summary, STATISTICS};
pub use types::{ColumnInfo, QueryResult, Row, Value};

/// Renders a header and rows as a left-aligned, pipe-separated table.
pub(crate) fn render_table(header: &[String], body: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in body {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(i) {
                Some(w) => *w = (*w).max(len),
                None => widths.push(len),
            }
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                format!("{cell:<w$}")
            })
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let separator = format!(
        "|{}|",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("|")
    );

    let mut out = String::new();
    out.push_str(&line(header));
    out.push('\n');
    out.push_str(&separator);
    for row in body {
        out.push('\n');
        out.push_str(&line(row));
    }
    out
}
