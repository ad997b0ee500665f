//! Execution Engine Trait - the contract between the gate and a store

use crate::error::Result;
use crate::execution::result::ResultSet;
use crate::gate::FinalStatement;
use async_trait::async_trait;

/// Runs statements the gate accepted. Taking [`FinalStatement`] rather than
/// `&str` means a caller cannot reach a store without going through
/// [`decide`](crate::gate::decide).
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Engine name for logs (e.g., "sqlite")
    fn name(&self) -> &'static str;

    /// Execute an accepted statement and materialize its rows.
    ///
    /// Store failures come back as [`ExplorerError::Execution`] or
    /// [`ExplorerError::Timeout`], never as a rejection.
    ///
    /// [`ExplorerError::Execution`]: crate::error::ExplorerError::Execution
    /// [`ExplorerError::Timeout`]: crate::error::ExplorerError::Timeout
    async fn run(&self, stmt: &FinalStatement) -> Result<ResultSet>;
}
