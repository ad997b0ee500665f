//! Extraction of the SQL statement from raw model output.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref SQL_FENCE: Regex = Regex::new(r"(?is)```[ \t]*sql\b(.*?)```").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").unwrap();
    static ref LEADING_SELECT: Regex = Regex::new(r"(?i)^select\b").unwrap();
}

/// Text exactly as the model produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawModelOutput(String);

impl RawModelOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RawModelOutput {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for RawModelOutput {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// The SQL substring isolated from a [`RawModelOutput`]. Not validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedStatement(String);

impl ExtractedStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ExtractedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the interior of the first ```` ```sql ```` fence, else the interior of
/// the first other fence that holds a SELECT, else the whole text. Always trimmed.
pub fn extract(raw: &RawModelOutput) -> ExtractedStatement {
    let text = raw.as_str();

    if let Some(body) = SQL_FENCE.captures(text).and_then(|c| c.get(1)) {
        return ExtractedStatement::new(body.as_str().trim());
    }

    let fenced_select = ANY_FENCE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|body| body.as_str().trim())
        .find(|body| LEADING_SELECT.is_match(body));
    if let Some(body) = fenced_select {
        return ExtractedStatement::new(body);
    }

    ExtractedStatement::new(text.trim())
}
