//! Policy Engine
//!
//! Turns a [`Classification`] into an accept/reject decision. The only rewrite
//! ever applied is appending a row limit. Pure: no I/O, no SQL execution.

use super::classify::{classify, Classification, DOLLAR_QUOTE};
use super::extract::ExtractedStatement;
use super::lexer::{tokenize, TokenKind};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ROW_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    ForbiddenKeyword,
    NotASelect,
    MultiStatement,
    /// Only produced when identifier validation is enabled.
    UnknownTable,
    /// Only produced when the grammar check is enabled.
    Unparseable,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::ForbiddenKeyword => "forbidden_keyword",
            RejectCode::NotASelect => "not_a_select",
            RejectCode::MultiStatement => "multi_statement",
            RejectCode::UnknownTable => "unknown_table",
            RejectCode::Unparseable => "unparseable",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured rejection: a machine-readable code plus a message for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// A statement that passed the gate. Only [`decide`] can produce one, so the
/// executor cannot be handed SQL that skipped validation. Deliberately not
/// `Deserialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FinalStatement {
    sql: String,
}

impl FinalStatement {
    fn accepted(sql: String) -> Self {
        Self { sql }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for FinalStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "value", rename_all = "snake_case")]
pub enum PolicyDecision {
    Accept(FinalStatement),
    Reject(Rejection),
}

impl PolicyDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, PolicyDecision::Accept(_))
    }

    pub fn into_result(self) -> std::result::Result<FinalStatement, Rejection> {
        match self {
            PolicyDecision::Accept(stmt) => Ok(stmt),
            PolicyDecision::Reject(rejection) => Err(rejection),
        }
    }
}

/// First match wins: any negative classification rejects; a SELECT without a
/// limit gets ` LIMIT {default_limit}` appended; a SELECT with one passes as is.
pub fn decide(
    classification: &Classification,
    stmt: &ExtractedStatement,
    default_limit: u64,
) -> PolicyDecision {
    // An accept is only minted from the statement's own classification.
    let derived;
    let classification = if classification.is_select() {
        derived = classify(stmt);
        &derived
    } else {
        classification
    };

    match classification {
        Classification::ContainsForbiddenKeyword { keyword, position } => {
            let what = if keyword == DOLLAR_QUOTE {
                "dollar-quoted body".to_string()
            } else {
                format!("forbidden keyword {}", keyword)
            };
            PolicyDecision::Reject(Rejection::new(
                RejectCode::ForbiddenKeyword,
                format!(
                    "{} at byte {}; only read-only SELECT statements are allowed",
                    what, position
                ),
            ))
        }
        Classification::MultiStatement {
            separators,
            position,
        } => PolicyDecision::Reject(Rejection::new(
            RejectCode::MultiStatement,
            format!(
                "multiple statements detected ({} separator(s), stacked at byte {}); submit exactly one SELECT",
                separators, position
            ),
        )),
        Classification::NonSelectForbidden { leading } => {
            let found = if leading.is_empty() {
                "an empty statement".to_string()
            } else {
                format!("'{}'", leading)
            };
            PolicyDecision::Reject(Rejection::new(
                RejectCode::NotASelect,
                format!("only SELECT queries are allowed, found {}", found),
            ))
        }
        Classification::Unterminated { token, position } => PolicyDecision::Reject(Rejection::new(
            RejectCode::NotASelect,
            format!(
                "statement ends inside an unterminated {} at byte {}; submit one complete SELECT",
                token.describe(),
                position
            ),
        )),
        Classification::Select { has_limit: true } => {
            PolicyDecision::Accept(FinalStatement::accepted(stmt.as_str().to_string()))
        }
        Classification::Select { has_limit: false } => {
            PolicyDecision::Accept(FinalStatement::accepted(with_row_limit(stmt.as_str(), default_limit)))
        }
    }
}

/// Strips one trailing terminator and appends the limit clause. When the text
/// ends inside a line comment the clause goes on a new line instead.
fn with_row_limit(sql: &str, limit: u64) -> String {
    let body = sql.trim_end();
    let body = body.strip_suffix(';').unwrap_or(body).trim_end();

    let ends_in_line_comment = tokenize(body)
        .iter()
        .rev()
        .find(|t| t.kind != TokenKind::Whitespace)
        .is_some_and(|t| t.kind == TokenKind::LineComment);
    let separator = if ends_in_line_comment { '\n' } else { ' ' };

    format!("{}{}LIMIT {}", body, separator, limit)
}
