//! Schema Introspector
//!
//! Table and column metadata read from the store. Feeds the model prompt and,
//! when enabled, the gate's unknown-table check. Never mutated by the gate.

use crate::error::{ExplorerError, Result};
use crate::execution::Database;
use crate::gate::lexer::{tokenize, Token, TokenKind};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as written in the DDL; may be empty in SQLite.
    pub data_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: BTreeMap<String, Vec<ColumnDescriptor>>,
}

/// Words that end a table reference in a FROM/JOIN list.
const CLAUSE_WORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "OUTER", "ON",
    "USING", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "EXCEPT", "INTERSECT",
    "WINDOW", "AS",
];

impl SchemaDescriptor {
    /// Reads user tables and views (skipping `sqlite_%` internals) with their columns.
    pub async fn introspect(db: &Database) -> Result<Self> {
        db.with_connection(false, |conn| read_schema(conn).map_err(ExplorerError::database))
            .await
    }

    pub fn add_table(&mut self, name: impl Into<String>, columns: Vec<(String, String)>) {
        let columns = columns
            .into_iter()
            .map(|(name, data_type)| ColumnDescriptor { name, data_type })
            .collect();
        self.tables.insert(name.into(), columns);
    }

    /// Case-insensitive, as in SQLite.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.keys().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnDescriptor]> {
        self.tables
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(table))
            .map(|(_, cols)| cols.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// One `table: col (TYPE), ...` line per table, the format given to the model.
    pub fn to_prompt_text(&self) -> String {
        self.tables
            .iter()
            .map(|(table, cols)| {
                let cols = cols
                    .iter()
                    .map(|c| {
                        if c.data_type.is_empty() {
                            c.name.clone()
                        } else {
                            format!("{} ({})", c.name, c.data_type)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}: {}", table, cols)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tables referenced after FROM/JOIN that this schema does not know,
    /// in order of first appearance. Table-valued functions, subqueries and
    /// SQLite internal tables are ignored.
    pub fn unknown_tables(&self, sql: &str) -> Vec<String> {
        let mut unknown: Vec<String> = Vec::new();
        for name in referenced_tables(sql) {
            if name.to_ascii_lowercase().starts_with("sqlite_") || self.has_table(&name) {
                continue;
            }
            if !unknown.iter().any(|u| u.eq_ignore_ascii_case(&name)) {
                unknown.push(name);
            }
        }
        unknown
    }
}

fn read_schema(conn: &Connection) -> rusqlite::Result<SchemaDescriptor> {
    let mut schema = SchemaDescriptor::default();

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for name in names {
        let mut info = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(&name)))?;
        let columns = info
            .query_map([], |row| {
                Ok(ColumnDescriptor {
                    name: row.get(1)?,
                    data_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        schema.tables.insert(name, columns);
    }

    Ok(schema)
}

/// Double-quotes an identifier for SQLite, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn identifier_text(token: &Token<'_>) -> Option<String> {
    match token.kind {
        TokenKind::Word => Some(token.text.to_string()),
        TokenKind::QuotedIdent if token.terminated => {
            let inner = &token.text[1..token.text.len() - 1];
            Some(match token.text.chars().next() {
                Some('"') => inner.replace("\"\"", "\""),
                Some('`') => inner.replace("``", "`"),
                _ => inner.to_string(),
            })
        }
        _ => None,
    }
}

fn is_clause_word(token: &Token<'_>) -> bool {
    token.kind == TokenKind::Word && CLAUSE_WORDS.iter().any(|w| token.text.eq_ignore_ascii_case(w))
}

/// Table names following FROM and JOIN, including comma-separated FROM lists.
/// For `schema.table` only the table part is returned.
fn referenced_tables(sql: &str) -> Vec<String> {
    let tokens: Vec<Token<'_>> = tokenize(sql).into_iter().filter(|t| !t.is_trivia()).collect();
    let mut names = Vec::new();
    let mut idx = 0;

    while idx < tokens.len() {
        let is_from = tokens[idx].is_word("FROM");
        if !is_from && !tokens[idx].is_word("JOIN") {
            idx += 1;
            continue;
        }
        idx += 1;

        loop {
            let Some(mut name) = tokens.get(idx).and_then(identifier_text) else {
                break;
            };
            if tokens.get(idx).is_some_and(is_clause_word) {
                break;
            }
            idx += 1;
            while tokens.get(idx).is_some_and(|t| t.is_punct('.')) {
                match tokens.get(idx + 1).and_then(identifier_text) {
                    Some(part) => {
                        name = part;
                        idx += 2;
                    }
                    None => break,
                }
            }
            if tokens.get(idx).is_some_and(|t| t.is_punct('(')) {
                // table-valued function
                break;
            }
            names.push(name);

            if tokens.get(idx).is_some_and(|t| t.is_word("AS")) {
                idx += 2;
            } else if tokens
                .get(idx)
                .is_some_and(|t| identifier_text(t).is_some() && !is_clause_word(t))
            {
                idx += 1;
            }

            if is_from && tokens.get(idx).is_some_and(|t| t.is_punct(',')) {
                idx += 1;
                continue;
            }
            break;
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaDescriptor {
        let mut schema = SchemaDescriptor::default();
        schema.add_table(
            "orders",
            vec![
                ("id".to_string(), "INTEGER".to_string()),
                ("amount".to_string(), "REAL".to_string()),
            ],
        );
        schema.add_table("customers", vec![("name".to_string(), String::new())]);
        schema
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(
            schema().to_prompt_text(),
            "customers: name\norders: id (INTEGER), amount (REAL)"
        );
    }

    #[test]
    fn test_referenced_tables() {
        assert_eq!(
            referenced_tables("SELECT * FROM main.orders o JOIN \"customers\" AS c ON o.id = c.id"),
            vec!["orders", "customers"]
        );
        assert_eq!(referenced_tables("SELECT * FROM a, b x, c WHERE 1"), vec!["a", "b", "c"]);
        assert_eq!(
            referenced_tables("SELECT * FROM (SELECT * FROM inner_t) s"),
            vec!["inner_t"]
        );
        assert!(referenced_tables("SELECT * FROM pragma_table_info('t')").is_empty());
    }

    #[test]
    fn test_unknown_tables() {
        let schema = schema();
        assert!(schema.unknown_tables("SELECT * FROM ORDERS JOIN customers ON 1").is_empty());
        assert_eq!(
            schema.unknown_tables("SELECT * FROM orders, refunds r, refunds"),
            vec!["refunds"]
        );
        assert!(schema.unknown_tables("SELECT name FROM sqlite_master").is_empty());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("my \"odd\" table"), "\"my \"\"odd\"\" table\"");
    }
}
