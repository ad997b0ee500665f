//! CSV Import - loads a CSV file into a table the gate can then query
//!
//! The table is replaced if it already exists. Column types are inferred from
//! the data: every non-empty cell an integer -> INTEGER, a number -> REAL,
//! `true`/`false` -> BOOLEAN (stored as 0/1), anything else -> TEXT.

use crate::error::{ExplorerError, Result};
use crate::execution::Database;
use crate::schema::{quote_identifier, ColumnDescriptor};
use csv::ReaderBuilder;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
}

impl ColumnType {
    fn declared(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
        }
    }

    fn of_cell(cell: &str) -> ColumnType {
        if cell.parse::<i64>().is_ok() {
            ColumnType::Integer
        } else if cell.parse::<f64>().is_ok() {
            ColumnType::Real
        } else if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }

    /// Widest type that holds both.
    fn merge(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Real) | (Real, Integer) => Real,
            _ => Text,
        }
    }

    fn coerce(&self, cell: &str) -> SqlValue {
        if cell.is_empty() {
            return SqlValue::Null;
        }
        match self {
            ColumnType::Integer => cell.parse().map(SqlValue::Integer).unwrap_or(SqlValue::Null),
            ColumnType::Real => cell.parse().map(SqlValue::Real).unwrap_or(SqlValue::Null),
            ColumnType::Boolean => SqlValue::Integer(i64::from(cell.eq_ignore_ascii_case("true"))),
            ColumnType::Text => SqlValue::Text(cell.to_string()),
        }
    }
}

pub async fn import_csv_file(
    db: &Database,
    table: &str,
    path: impl AsRef<Path>,
) -> Result<ImportSummary> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    import_csv_str(db, table, text).await
}

pub async fn import_csv_str(db: &Database, table: &str, csv_text: String) -> Result<ImportSummary> {
    let table = validate_table_name(table)?;
    let (headers, records) = parse_csv(&csv_text)?;
    let types = infer_types(headers.len(), &records);

    let columns: Vec<ColumnDescriptor> = headers
        .iter()
        .zip(&types)
        .map(|(name, ty)| ColumnDescriptor {
            name: name.clone(),
            data_type: ty.declared().to_string(),
        })
        .collect();

    let summary = ImportSummary {
        table: table.clone(),
        columns: columns.clone(),
        rows: records.len(),
    };

    db.with_connection(true, move |conn| {
        let tx = conn.transaction().map_err(ExplorerError::database)?;
        let quoted = quote_identifier(&table);
        let column_defs = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.data_type))
            .collect::<Vec<_>>()
            .join(", ");

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {quoted}; CREATE TABLE {quoted} ({column_defs});"
        ))
        .map_err(ExplorerError::database)?;

        {
            let names = columns
                .iter()
                .map(|c| quote_identifier(&c.name))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ");
            let mut insert = tx
                .prepare(&format!("INSERT INTO {quoted} ({names}) VALUES ({placeholders})"))
                .map_err(ExplorerError::database)?;

            for record in &records {
                let values = types
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| ty.coerce(record.get(idx).map(String::as_str).unwrap_or("")));
                insert
                    .execute(rusqlite::params_from_iter(values))
                    .map_err(ExplorerError::database)?;
            }
        }

        tx.commit().map_err(ExplorerError::database)?;
        Ok(())
    })
    .await?;

    info!(table = %summary.table, rows = summary.rows, columns = summary.columns.len(), "imported CSV");
    Ok(summary)
}

fn validate_table_name(table: &str) -> Result<String> {
    let table = table.trim();
    if table.is_empty() {
        return Err(ExplorerError::Config("table name must not be empty".to_string()));
    }
    if table.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(ExplorerError::Config(format!(
            "table name '{}' is reserved by SQLite",
            table
        )));
    }
    Ok(table.to_string())
}

/// Headers (blank ones named `column_N`, duplicates suffixed) and trimmed records.
fn parse_csv(text: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Vec<String> = Vec::new();
    for (idx, raw) in rdr.headers()?.iter().enumerate() {
        let base = match raw.trim() {
            "" => format!("column_{}", idx + 1),
            name => name.to_string(),
        };
        let mut name = base.clone();
        let mut n = 2;
        while headers.iter().any(|h| h.eq_ignore_ascii_case(&name)) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        headers.push(name);
    }
    if headers.is_empty() {
        return Err(ExplorerError::Config("CSV has no header row".to_string()));
    }

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.len() > headers.len() {
            warn!(
                line = record.position().map(|p| p.line()),
                cells = record.len(),
                columns = headers.len(),
                "record is wider than the header row; extra cells dropped"
            );
        }
        records.push(
            record
                .iter()
                .take(headers.len())
                .map(|cell| cell.trim().to_string())
                .collect(),
        );
    }

    Ok((headers, records))
}

fn infer_types(width: usize, records: &[Vec<String>]) -> Vec<ColumnType> {
    (0..width)
        .map(|idx| {
            records
                .iter()
                .filter_map(|r| r.get(idx))
                .filter(|cell| !cell.is_empty())
                .map(|cell| ColumnType::of_cell(cell))
                .reduce(ColumnType::merge)
                .unwrap_or(ColumnType::Text)
        })
        .collect()
}
