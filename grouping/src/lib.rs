pub mod aggregate;
pub mod errors;
pub mod executor;
pub mod metrics_defs;
pub mod rest;
pub mod tree;

pub use aggregate::{AggregatedFailure, ErrorAggregator};
pub use errors::GroupingError;
pub use executor::{DEFAULT_WORKER_POOL_SIZE, TaskExecutor};
pub use rest::{Invoker, RestInvoker};
pub use tree::TaskNode;

use serde_json::Value;
use std::sync::Arc;

/// The main entry for running a group of REST calls described by a task
/// tree: loads the tree and executes it on a fresh worker pool.
pub async fn start(
    tree: &Value,
    invoker: Arc<dyn Invoker>,
    pool_size: usize,
) -> Result<Value, GroupingError> {
    let root = tree::load(tree)?;
    let executor = TaskExecutor::new(invoker).with_pool_size(pool_size);
    executor.run(&root).await
}
