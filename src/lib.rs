pub mod config;
pub mod error;
pub mod execution;
pub mod explorer;
pub mod gate;
pub mod ingest;
pub mod llm;
pub mod schema;

pub use config::ExplorerConfig;
pub use error::{ExplorerError, Result};
pub use execution::{Database, QueryExecutor, ResultSet};
pub use explorer::{Explorer, QueryReport};
pub use gate::{
    classify, decide, extract, Classification, ExtractedStatement, FinalStatement, GateConfig,
    PolicyDecision, QueryGate, RawModelOutput, RejectCode, Rejection, Verdict,
};
pub use schema::SchemaDescriptor;
