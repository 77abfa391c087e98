//! Table detection over page layout text.
//!
//! The input is what [`crate::layout`] produces: one line per baseline,
//! with a tab between glyphs that sit a cell gap apart. A tabular region is
//! a maximal run of at least two consecutive lines that split into the same
//! number (≥ 2) of cells, where a cell boundary is a tab or a run of two or
//! more spaces.

use std::collections::BTreeMap;

/// A table found on one page. The first row became `headers`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DetectedTable {
    /// Row records keyed by header.
    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Aligned text grid: a header line, then one line per row prefixed
    /// by its 0-based row index.
    pub fn render(&self) -> String {
        let index_width = self
            .rows
            .len()
            .saturating_sub(1)
            .to_string()
            .len();

        let widths: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(format_line(&" ".repeat(index_width), &self.headers, &widths));
        for (i, row) in self.rows.iter().enumerate() {
            lines.push(format_line(
                &format!("{:<width$}", i, width = index_width),
                row,
                &widths,
            ));
        }
        lines.join("\n")
    }
}

fn format_line(prefix: &str, cells: &[String], widths: &[usize]) -> String {
    let mut line = prefix.to_string();
    for (cell, width) in cells.iter().zip(widths) {
        line.push_str("  ");
        line.push_str(&format!("{:>width$}", cell, width = *width));
    }
    line.trim_end().to_string()
}

/// Split a line into cells on tabs or runs of two or more spaces.
pub fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut pending_spaces = 0usize;

    for ch in line.trim().chars() {
        match ch {
            '\t' => {
                pending_spaces = 2;
            }
            ' ' => pending_spaces += 1,
            _ => {
                if pending_spaces >= 2 {
                    cells.push(std::mem::take(&mut current));
                } else if pending_spaces == 1 {
                    current.push(' ');
                }
                pending_spaces = 0;
                current.push(ch);
            }
        }
    }
    if !current.is_empty() {
        cells.push(current);
    }
    cells
}

/// Find every tabular region in a page's text, in reading order.
pub fn detect_tables(page_text: &str) -> Vec<DetectedTable> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    for line in page_text.lines() {
        let cells = split_cells(line);
        let continues = cells.len() >= 2
            && run
                .first()
                .map_or(true, |first| first.len() == cells.len());

        if continues {
            run.push(cells);
            continue;
        }

        flush_run(&mut run, &mut tables);
        if cells.len() >= 2 {
            run.push(cells);
        }
    }
    flush_run(&mut run, &mut tables);

    tables
}

fn flush_run(run: &mut Vec<Vec<String>>, tables: &mut Vec<DetectedTable>) {
    if run.len() >= 2 {
        let mut rows = std::mem::take(run);
        let headers = rows
            .remove(0)
            .into_iter()
            .enumerate()
            .map(|(i, h)| if h.is_empty() { format!("col_{}", i) } else { h })
            .collect();
        tables.push(DetectedTable { headers, rows });
    }
    run.clear();
}
