//! Explorer - question -> model -> gate -> store
//!
//! Wires the pieces together for one request. Model output and hand-written SQL
//! take the same path through the gate; nothing reaches the store unless the
//! gate produced a [`FinalStatement`](crate::gate::FinalStatement).

use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, Result};
use crate::execution::{Database, QueryExecutor, ResultSet};
use crate::gate::{PolicyDecision, QueryGate, RawModelOutput};
use crate::llm::{LlmClient, SqlGenerator};
use crate::schema::SchemaDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one accepted and executed request.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub request_id: Uuid,
    /// Set when the SQL came from the model.
    pub question: Option<String>,
    /// The statement as executed, after the LIMIT rewrite.
    pub sql: String,
    pub result: ResultSet,
    pub executed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

pub struct Explorer {
    db: Database,
    gate: QueryGate,
    generator: Option<Box<dyn SqlGenerator>>,
}

impl Explorer {
    pub fn new(db: Database, gate: QueryGate) -> Self {
        Self {
            db,
            gate,
            generator: None,
        }
    }

    /// Builds the gate, executor limits and model client from `config`.
    pub fn from_config(db: Database, config: &ExplorerConfig) -> Result<Self> {
        let explorer = Self::new(config.configure(db), QueryGate::new(config.gate_config()));
        let client = LlmClient::new(config.llm.clone())?;
        Ok(explorer.with_generator(client))
    }

    pub fn with_generator(mut self, generator: impl SqlGenerator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn gate(&self) -> &QueryGate {
        &self.gate
    }

    pub async fn schema(&self) -> Result<SchemaDescriptor> {
        SchemaDescriptor::introspect(&self.db).await
    }

    /// Gates and runs SQL written by a person (or pasted model output).
    pub async fn run_sql(&self, raw: &str) -> Result<QueryReport> {
        let schema = if self.gate.config().validate_identifiers {
            Some(self.schema().await?)
        } else {
            None
        };
        self.execute(None, RawModelOutput::from(raw), schema.as_ref())
            .await
    }

    /// Asks the model for SQL answering `question`, then gates and runs it.
    pub async fn ask(&self, question: &str) -> Result<QueryReport> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| ExplorerError::Config("no SQL generator configured".to_string()))?;

        let schema = self.schema().await?;
        if schema.is_empty() {
            warn!("database has no tables; the model will be guessing");
        }

        let raw = generator.generate(question, &schema).await?;
        debug!(raw = raw.as_str(), "model output");
        self.execute(Some(question.to_string()), raw, Some(&schema))
            .await
    }

    async fn execute(
        &self,
        question: Option<String>,
        raw: RawModelOutput,
        schema: Option<&SchemaDescriptor>,
    ) -> Result<QueryReport> {
        let request_id = Uuid::new_v4();
        let start_time = Instant::now();
        let verdict = self.gate.check(&raw, schema);

        let stmt = match verdict.decision {
            PolicyDecision::Accept(stmt) => stmt,
            PolicyDecision::Reject(rejection) => {
                info!(
                    %request_id,
                    code = %rejection.code,
                    sql = %verdict.extracted,
                    "statement rejected"
                );
                return Err(ExplorerError::Blocked(rejection));
            }
        };

        let executed_at = Utc::now();
        let result = self.db.run(&stmt).await.map_err(|e| {
            warn!(%request_id, error = %e, "accepted statement failed");
            e
        })?;

        Ok(QueryReport {
            request_id,
            question,
            sql: stmt.as_str().to_string(),
            result,
            executed_at,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}
