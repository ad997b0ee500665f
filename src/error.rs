use crate::gate::Rejection;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Longest driver message surfaced to a caller.
const MAX_DRIVER_MESSAGE_LEN: usize = 240;

#[derive(Error, Debug)]
pub enum ExplorerError {
    /// The gate refused the statement. Recoverable, shown to the user verbatim.
    #[error("query blocked: {0}")]
    Blocked(Rejection),

    /// The store failed an accepted statement. The message is already sanitized.
    #[error("query failed: {0}")]
    Execution(String),

    #[error("query failed: execution exceeded {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExplorerError {
    /// Wraps a driver failure that happened while running an accepted statement.
    pub fn execution(err: impl std::fmt::Display) -> Self {
        ExplorerError::Execution(sanitize_driver_message(&err.to_string()))
    }

    /// Wraps a driver failure outside the query path (import, introspection).
    pub fn database(err: impl std::fmt::Display) -> Self {
        ExplorerError::Database(sanitize_driver_message(&err.to_string()))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, ExplorerError::Blocked(_))
    }
}

impl From<Rejection> for ExplorerError {
    fn from(rejection: Rejection) -> Self {
        ExplorerError::Blocked(rejection)
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;

lazy_static! {
    static ref PATH_PATTERN: Regex =
        Regex::new(r#"(^|[\s'"(=])(?:[A-Za-z]:\\|/)[^\s'"`,;:)]*"#).expect("path pattern compiles");
    static ref CREDENTIAL_PATTERN: Regex =
        Regex::new(r"(?i)\b(password|passwd|pwd|token|secret|api[_-]?key)\s*=\s*\S+")
            .expect("credential pattern compiles");
}

/// Masks file paths and credential-looking assignments in a driver message and
/// bounds its length.
pub fn sanitize_driver_message(message: &str) -> String {
    let masked = PATH_PATTERN.replace_all(message, "${1}<path>");
    let masked = CREDENTIAL_PATTERN.replace_all(&masked, "$1=<redacted>");
    let trimmed = masked.trim();

    if trimmed.chars().count() <= MAX_DRIVER_MESSAGE_LEN {
        return trimmed.to_string();
    }
    let mut bounded: String = trimmed.chars().take(MAX_DRIVER_MESSAGE_LEN).collect();
    bounded.push_str("...");
    bounded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_masks_paths() {
        let msg = sanitize_driver_message("unable to open database file: /var/data/secret.db");
        assert_eq!(msg, "unable to open database file: <path>");
    }

    #[test]
    fn test_sanitize_masks_credentials() {
        let msg = sanitize_driver_message("connect failed password=hunter2 host=db");
        assert!(!msg.contains("hunter2"));
        assert!(msg.contains("password=<redacted>"));
    }

    #[test]
    fn test_sanitize_keeps_plain_messages() {
        assert_eq!(sanitize_driver_message("no such table: orders"), "no such table: orders");
    }

    #[test]
    fn test_sanitize_bounds_length() {
        let long = "x".repeat(1000);
        let msg = sanitize_driver_message(&long);
        assert_eq!(msg.chars().count(), MAX_DRIVER_MESSAGE_LEN + 3);
    }
}
