//! SQL Safety Gate
//!
//! Decides whether untrusted, model-generated SQL may run:
//! extraction -> classification (keyword scan + stacked statement check) ->
//! policy decision -> optional hardening. Everything here is pure and
//! synchronous; a `QueryGate` can be shared across requests freely.

pub mod classify;
pub mod extract;
pub mod grammar;
pub mod lexer;
pub mod policy;
pub mod splitter;

pub use classify::{classify, classify_with, Classification, KeywordSet, DEFAULT_FORBIDDEN_KEYWORDS};
pub use extract::{extract, ExtractedStatement, RawModelOutput};
pub use policy::{decide, FinalStatement, PolicyDecision, RejectCode, Rejection, DEFAULT_ROW_LIMIT};
pub use splitter::count_statements;

use crate::schema::SchemaDescriptor;
use serde::Serialize;
use tracing::{debug, warn};

/// Gate settings supplied by the deployer. Built from
/// [`ExplorerConfig`](crate::config::ExplorerConfig), which only lets keywords be
/// added to the forbidden set, never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateConfig {
    pub default_limit: u64,
    pub forbidden_keywords: KeywordSet,
    /// Reject statements that reference tables missing from the schema.
    pub validate_identifiers: bool,
    /// Require the statement to parse as exactly one query.
    pub grammar_check: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_ROW_LIMIT,
            forbidden_keywords: KeywordSet::default(),
            validate_identifiers: false,
            grammar_check: false,
        }
    }
}

/// Everything the gate learned about one statement.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub extracted: ExtractedStatement,
    pub classification: Classification,
    pub decision: PolicyDecision,
}

#[derive(Debug, Clone, Default)]
pub struct QueryGate {
    config: GateConfig,
}

impl QueryGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Extracts the statement from model output and evaluates it.
    pub fn check(&self, raw: &RawModelOutput, schema: Option<&SchemaDescriptor>) -> Verdict {
        self.evaluate(extract(raw), schema)
    }

    pub fn evaluate(&self, stmt: ExtractedStatement, schema: Option<&SchemaDescriptor>) -> Verdict {
        let classification = classify_with(&stmt, &self.config.forbidden_keywords);
        debug!(?classification, "classified statement");

        let decision = match decide(&classification, &stmt, self.config.default_limit) {
            PolicyDecision::Accept(final_stmt) => match self.harden(&final_stmt, schema) {
                Ok(()) => PolicyDecision::Accept(final_stmt),
                Err(rejection) => PolicyDecision::Reject(rejection),
            },
            rejected => rejected,
        };

        Verdict {
            extracted: stmt,
            classification,
            decision,
        }
    }

    fn harden(
        &self,
        stmt: &FinalStatement,
        schema: Option<&SchemaDescriptor>,
    ) -> std::result::Result<(), Rejection> {
        if self.config.grammar_check {
            grammar::check_grammar(stmt.as_str())?;
        }

        if self.config.validate_identifiers {
            match schema {
                Some(schema) => {
                    let unknown = schema.unknown_tables(stmt.as_str());
                    if !unknown.is_empty() {
                        return Err(Rejection::new(
                            RejectCode::UnknownTable,
                            format!("unknown table(s): {}", unknown.join(", ")),
                        ));
                    }
                }
                None => warn!("identifier validation enabled but no schema supplied; skipping"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_check_end_to_end() {
        let gate = QueryGate::default();
        let verdict = gate.check(&RawModelOutput::from("```sql\nSELECT * FROM orders;\n```"), None);
        assert_eq!(verdict.extracted.as_str(), "SELECT * FROM orders;");
        match verdict.decision {
            PolicyDecision::Accept(stmt) => assert_eq!(stmt.as_str(), "SELECT * FROM orders LIMIT 100"),
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_gate_uses_configured_limit_and_keywords() {
        let mut config = GateConfig {
            default_limit: 7,
            ..GateConfig::default()
        };
        config.forbidden_keywords.extend(["pragma"]);
        let gate = QueryGate::new(config);

        let verdict = gate.evaluate(ExtractedStatement::new("SELECT 1"), None);
        assert_eq!(verdict.decision.into_result().unwrap().as_str(), "SELECT 1 LIMIT 7");

        let verdict = gate.evaluate(ExtractedStatement::new("SELECT * FROM pragma_table_info('t')"), None);
        assert!(verdict.decision.is_accept());

        let verdict = gate.evaluate(ExtractedStatement::new("SELECT 1 -- pragma"), None);
        assert_eq!(
            verdict.decision.into_result().unwrap_err().code,
            RejectCode::ForbiddenKeyword
        );
    }

    #[test]
    fn test_gate_grammar_check() {
        let gate = QueryGate::new(GateConfig {
            grammar_check: true,
            ..GateConfig::default()
        });
        let verdict = gate.evaluate(ExtractedStatement::new("SELECT * FROM t WHERE (a = 1"), None);
        assert_eq!(verdict.classification, Classification::Select { has_limit: false });
        assert_eq!(
            verdict.decision.into_result().unwrap_err().code,
            RejectCode::Unparseable
        );
    }

    #[test]
    fn test_gate_identifier_validation() {
        let mut schema = SchemaDescriptor::default();
        schema.add_table("orders", vec![("id".to_string(), "INTEGER".to_string())]);
        let gate = QueryGate::new(GateConfig {
            validate_identifiers: true,
            ..GateConfig::default()
        });

        let ok = gate.evaluate(ExtractedStatement::new("SELECT id FROM orders"), Some(&schema));
        assert!(ok.decision.is_accept());

        let bad = gate.evaluate(ExtractedStatement::new("SELECT * FROM order_items"), Some(&schema));
        let rejection = bad.decision.into_result().unwrap_err();
        assert_eq!(rejection.code, RejectCode::UnknownTable);
        assert!(rejection.message.contains("order_items"));
    }
}
