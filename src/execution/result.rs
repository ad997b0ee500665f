//! Query Result - materialized rows from an accepted statement

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered rows, each aligned with `columns`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names in select-list order (duplicates are kept)
    pub columns: Vec<String>,

    pub rows: Vec<Vec<Value>>,

    /// True when the executor stopped at its row cap before the store ran dry
    pub truncated: bool,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, truncated: bool) -> Self {
        Self {
            columns,
            rows,
            truncated,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row_idx`; the first column wins on duplicate names.
    pub fn get(&self, row_idx: usize, column: &str) -> Option<&Value> {
        let col_idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row_idx)?.get(col_idx)
    }

    /// Rows as column-name -> value mappings.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, Value>>()
            })
            .collect()
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "columns": self.columns,
            "rows": self.to_records(),
            "row_count": self.row_count(),
            "truncated": self.truncated,
        })
    }

    /// CSV with a header row. Fields containing separators, quotes or newlines
    /// are quoted per RFC 4180; NULL becomes an empty field.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(cell_text))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::ExplorerError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Plain-text grid for terminals.
    pub fn render_table(&self) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| cell_text(v).replace('\n', " ")).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (idx, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(idx) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        let line = |values: &[String]| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<width$}", v, width = *w))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        out.push_str(&line(&self.columns));
        out.push('\n');
        out.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        out.push('\n');
        for row in &cells {
            out.push_str(&line(row));
            out.push('\n');
        }
        out.push_str(&format!(
            "({} row{}{})\n",
            self.row_count(),
            if self.row_count() == 1 { "" } else { "s" },
            if self.truncated { ", truncated" } else { "" }
        ));
        out
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
