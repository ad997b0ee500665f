//! Explorer configuration
//!
//! Values come from, in increasing precedence: defaults, an optional JSON file,
//! environment variables (a `.env` file is honoured by the binary), and CLI flags.
//! Deployers can only add forbidden keywords; the built-in set always applies.

use crate::error::{ExplorerError, Result};
use crate::execution::{Database, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_MAX_ROWS};
use crate::gate::{GateConfig, KeywordSet, DEFAULT_ROW_LIMIT};
use crate::llm::LlmSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub db_path: Option<PathBuf>,
    pub default_limit: u64,
    pub extra_forbidden_keywords: Vec<String>,
    pub validate_identifiers: bool,
    pub grammar_check: bool,
    pub execution_timeout_secs: u64,
    pub max_rows: usize,
    pub llm: LlmSettings,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_limit: DEFAULT_ROW_LIMIT,
            extra_forbidden_keywords: Vec::new(),
            validate_identifiers: false,
            grammar_check: false,
            execution_timeout_secs: DEFAULT_EXECUTION_TIMEOUT.as_secs(),
            max_rows: DEFAULT_MAX_ROWS,
            llm: LlmSettings::default(),
        }
    }
}

impl ExplorerConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ExplorerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlays variables read through `lookup`:
    /// `QUERIUMS_DB`, `QUERIUMS_DEFAULT_LIMIT`, `QUERIUMS_FORBIDDEN_KEYWORDS`
    /// (comma separated, added to the built-in set), `QUERIUMS_VALIDATE_IDENTIFIERS`,
    /// `QUERIUMS_GRAMMAR_CHECK`, `QUERIUMS_TIMEOUT_SECS`, `QUERIUMS_MAX_ROWS`,
    /// `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup("QUERIUMS_DB") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(limit) = lookup("QUERIUMS_DEFAULT_LIMIT") {
            self.default_limit = parse_number("QUERIUMS_DEFAULT_LIMIT", &limit)?;
        }
        if let Some(keywords) = lookup("QUERIUMS_FORBIDDEN_KEYWORDS") {
            self.extra_forbidden_keywords.extend(
                keywords
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(flag) = lookup("QUERIUMS_VALIDATE_IDENTIFIERS") {
            self.validate_identifiers = parse_flag("QUERIUMS_VALIDATE_IDENTIFIERS", &flag)?;
        }
        if let Some(flag) = lookup("QUERIUMS_GRAMMAR_CHECK") {
            self.grammar_check = parse_flag("QUERIUMS_GRAMMAR_CHECK", &flag)?;
        }
        if let Some(secs) = lookup("QUERIUMS_TIMEOUT_SECS") {
            self.execution_timeout_secs = parse_number("QUERIUMS_TIMEOUT_SECS", &secs)?;
        }
        if let Some(rows) = lookup("QUERIUMS_MAX_ROWS") {
            self.max_rows = parse_number("QUERIUMS_MAX_ROWS", &rows)?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 {
            return Err(ExplorerError::Config("default_limit must be at least 1".to_string()));
        }
        if self.execution_timeout_secs == 0 {
            return Err(ExplorerError::Config(
                "execution_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_rows == 0 {
            return Err(ExplorerError::Config("max_rows must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn gate_config(&self) -> GateConfig {
        let mut forbidden_keywords = KeywordSet::default();
        forbidden_keywords.extend(&self.extra_forbidden_keywords);
        GateConfig {
            default_limit: self.default_limit,
            forbidden_keywords,
            validate_identifiers: self.validate_identifiers,
            grammar_check: self.grammar_check,
        }
    }

    /// Applies the executor limits to a database handle.
    pub fn configure(&self, db: Database) -> Database {
        db.with_timeout(self.execution_timeout())
            .with_max_rows(self.max_rows)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ExplorerError::Config(format!("{} must be a number, got '{}'", key, value)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ExplorerError::Config(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::DEFAULT_FORBIDDEN_KEYWORDS;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<ExplorerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExplorerConfig::default().with_env(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = ExplorerConfig::default();
        assert_eq!(config.default_limit, 100);
        assert_eq!(config.gate_config().forbidden_keywords.len(), DEFAULT_FORBIDDEN_KEYWORDS.len());
        assert_eq!(config.execution_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let config = from_vars(&[
            ("QUERIUMS_DEFAULT_LIMIT", "25"),
            ("QUERIUMS_FORBIDDEN_KEYWORDS", "attach, pragma,,"),
            ("QUERIUMS_GRAMMAR_CHECK", "yes"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
        ])
        .unwrap();
        assert_eq!(config.default_limit, 25);
        assert!(config.grammar_check);
        assert_eq!(config.llm.model, "gpt-4o-mini");

        let gate = config.gate_config();
        assert!(gate.forbidden_keywords.contains("ATTACH"));
        assert!(gate.forbidden_keywords.contains("PRAGMA"));
        assert!(gate.forbidden_keywords.contains("DROP"));
    }

    #[test]
    fn test_env_rejects_bad_values() {
        assert!(from_vars(&[("QUERIUMS_DEFAULT_LIMIT", "lots")]).is_err());
        assert!(from_vars(&[("QUERIUMS_DEFAULT_LIMIT", "0")]).is_err());
        assert!(from_vars(&[("QUERIUMS_GRAMMAR_CHECK", "maybe")]).is_err());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queriums.json");
        std::fs::write(
            &path,
            r#"{"default_limit": 50, "extra_forbidden_keywords": ["attach"], "max_rows": 500}"#,
        )
        .unwrap();

        let config = ExplorerConfig::load(&path).unwrap();
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.max_rows, 500);
        assert_eq!(config.execution_timeout_secs, 30);
        assert!(config.gate_config().forbidden_keywords.contains("attach"));
    }
}
