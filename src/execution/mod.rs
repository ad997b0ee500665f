//! Execution layer: the executor contract, the SQLite engine behind it, and the
//! result set it produces.

pub mod engine;
pub mod result;
pub mod sqlite_engine;

pub use engine::QueryExecutor;
pub use result::ResultSet;
pub use sqlite_engine::{Database, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_MAX_ROWS};
