//! Task tree execution.
//!
//! One bounded worker pool is provisioned per `run()` and shared by every
//! group in the tree; leaves take a pool permit around their outbound call.
//! Serial groups pipeline each child's result into the next child's payload;
//! parallel groups collect results in completion order so a slow branch does
//! not stall the aggregated view.

use crate::aggregate::ErrorAggregator;
use crate::errors::{GroupingError, Result};
use crate::metrics_defs;
use crate::rest::Invoker;
use crate::tree::{CallTask, TaskNode};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};

/// Default width of the per-run worker pool.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 64;

/// Pipelined arguments flowing between serial stages.
#[derive(Clone, Debug, Default)]
pub struct Pipe(Map<String, Value>);

impl Pipe {
    pub fn none() -> Self {
        Self::default()
    }

    /// Reduces a stage result to pipelined arguments: an object is taken
    /// as-is, a list merges its non-empty dictionary elements left-to-right,
    /// anything else degrades to no pipe.
    pub fn from_result(value: &Value) -> Self {
        match value {
            Value::Object(map) => Pipe(map.clone()),
            Value::Array(elements) => {
                let mut merged = Map::new();
                for element in elements {
                    let Pipe(part) = Pipe::from_result(element);
                    for (key, value) in part {
                        merged.insert(key, value);
                    }
                }
                Pipe(merged)
            }
            _ => Pipe::none(),
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone)]
pub struct TaskExecutor {
    invoker: Arc<dyn Invoker>,
    pool_size: usize,
}

impl TaskExecutor {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self {
            invoker,
            pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Executes a task tree. The worker pool lives exactly as long as this
    /// call.
    pub async fn run(&self, tree: &TaskNode) -> Result<Value> {
        let pool = Arc::new(Semaphore::new(self.pool_size));
        self.run_node(tree.clone(), Pipe::none(), pool).await
    }

    fn run_node(
        &self,
        node: TaskNode,
        pipe: Pipe,
        pool: Arc<Semaphore>,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
        Box::pin(async move {
            match node {
                TaskNode::Call(call) => self.run_call(call, pipe, pool).await,
                TaskNode::Serial { children, timeout } => {
                    let stages = self.run_serial(children, pipe, pool);
                    match timeout {
                        Some(duration) => tokio::time::timeout(duration, stages)
                            .await
                            .unwrap_or_else(|_| {
                                metrics::counter!(metrics_defs::GROUP_TIMEOUTS.name).increment(1);
                                Err(GroupingError::GroupTimeout(duration))
                            }),
                        None => stages.await,
                    }
                }
                TaskNode::Parallel { children, timeout } => {
                    self.run_parallel(children, pipe, pool, timeout).await
                }
            }
        })
    }

    async fn run_call(&self, call: CallTask, pipe: Pipe, pool: Arc<Semaphore>) -> Result<Value> {
        // Pipelined arguments only fill keys the payload does not already
        // bind; user input dominates pipeline data
        let payload = if call.with_pipe && !pipe.is_empty() {
            let mut merged = call.payload.clone();
            for (key, value) in &pipe.0 {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
            merged
        } else {
            call.payload.clone()
        };

        let _permit = pool
            .acquire()
            .await
            .map_err(|e| GroupingError::Internal(format!("worker pool closed: {e}")))?;

        metrics::counter!(metrics_defs::CALLS_STARTED.name).increment(1);
        let started = Instant::now();
        tracing::debug!(target = %call.target, "Invoking task leaf");

        let result = self
            .invoker
            .invoke(&call.target, call.headers.as_ref(), &payload, call.timeout)
            .await;

        metrics::histogram!(metrics_defs::CALL_DURATION.name)
            .record(started.elapsed().as_secs_f64());
        if let Err(error) = &result {
            tracing::warn!(target = %call.target, %error, "Task leaf failed");
        }
        result
    }

    async fn run_serial(
        &self,
        children: Vec<TaskNode>,
        pipe: Pipe,
        pool: Arc<Semaphore>,
    ) -> Result<Value> {
        let mut accumulator = pipe;
        let mut results = Vec::with_capacity(children.len());

        for child in children {
            let result = self.run_node(child, accumulator, pool.clone()).await?;
            accumulator = Pipe::from_result(&result);
            results.push(result);
        }

        Ok(Value::Array(results))
    }

    async fn run_parallel(
        &self,
        children: Vec<TaskNode>,
        pipe: Pipe,
        pool: Arc<Semaphore>,
        timeout: Option<std::time::Duration>,
    ) -> Result<Value> {
        let total = children.len();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for (index, child) in children.into_iter().enumerate() {
            let executor = self.clone();
            let pipe = pipe.clone();
            let pool = pool.clone();
            let tx = tx.clone();
            let label = branch_label(index, &child);

            // Branches are detached: a group timeout abandons them and their
            // late results are discarded with the closed channel
            tokio::spawn(async move {
                let outcome = executor.run_node(child, pipe, pool).await;
                let _ = tx.send((label, outcome));
            });
        }
        drop(tx);

        let deadline = timeout.map(|duration| tokio::time::Instant::now() + duration);
        let mut results = Vec::with_capacity(total);
        let mut aggregator = ErrorAggregator::new();

        for _ in 0..total {
            let received = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        metrics::counter!(metrics_defs::GROUP_TIMEOUTS.name).increment(1);
                        return Err(GroupingError::GroupTimeout(
                            timeout.expect("deadline implies timeout"),
                        ));
                    }
                },
                None => rx.recv().await,
            };

            match received {
                Some((_, Ok(result))) => results.push(result),
                Some((label, Err(error))) => aggregator.add(&error, label),
                None => {
                    // A branch died without reporting (panic); surface it
                    let error = GroupingError::Internal(
                        "a parallel branch ended without reporting a result".to_string(),
                    );
                    tracing::error!(%error, "Parallel collection ended early");
                    aggregator.add(&error, "unknown");
                    break;
                }
            }
        }

        aggregator.check()?;
        Ok(Value::Array(results))
    }
}

fn branch_label(index: usize, node: &TaskNode) -> String {
    match node {
        TaskNode::Call(call) => call.target.clone(),
        TaskNode::Serial { .. } => format!("[+++]#{index}"),
        TaskNode::Parallel { .. } => format!("[###]#{index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Test invoker returning canned responses per target, with optional
    /// per-target delays and failures.
    #[derive(Default)]
    struct ScriptedInvoker {
        responses: HashMap<String, Value>,
        delays: HashMap<String, Duration>,
        failures: HashMap<String, u16>,
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    impl ScriptedInvoker {
        fn respond(mut self, target: &str, response: Value) -> Self {
            self.responses.insert(target.to_string(), response);
            self
        }

        fn delay(mut self, target: &str, delay: Duration) -> Self {
            self.delays.insert(target.to_string(), delay);
            self
        }

        fn fail(mut self, target: &str, status: u16) -> Self {
            self.failures.insert(target.to_string(), status);
            self
        }

        fn payload_sent_to(&self, target: &str) -> Option<Map<String, Value>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|(t, _)| t == target)
                .map(|(_, p)| p.clone())
        }
    }

    #[async_trait]
    impl Invoker for ScriptedInvoker {
        async fn invoke(
            &self,
            target: &str,
            _headers: Option<&Map<String, Value>>,
            payload: &Map<String, Value>,
            _timeout: Option<Duration>,
        ) -> Result<Value> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);

            self.calls
                .lock()
                .unwrap()
                .push((target.to_string(), payload.clone()));

            if let Some(delay) = self.delays.get(target) {
                tokio::time::sleep(*delay).await;
            }

            self.concurrent.fetch_sub(1, Ordering::SeqCst);

            if let Some(status) = self.failures.get(target) {
                return Err(GroupingError::Downstream {
                    target: target.to_string(),
                    status: *status,
                    detail: "scripted failure".to_string(),
                });
            }

            Ok(self
                .responses
                .get(target)
                .cloned()
                .unwrap_or_else(|| json!({"target": target})))
        }
    }

    fn executor(invoker: ScriptedInvoker) -> (Arc<ScriptedInvoker>, TaskExecutor) {
        let invoker = Arc::new(invoker);
        (invoker.clone(), TaskExecutor::new(invoker))
    }

    #[tokio::test]
    async fn test_serial_pipelines_results() {
        let (invoker, executor) =
            executor(ScriptedInvoker::default().respond("/a", json!({"token": "T"})));

        let node = tree::load(&json!({
            "[+++]": [
                {"(://)": "/a", "(...)": {}},
                {"(://)": "/b", "(.|.)": {"b": 2}},
            ],
        }))
        .unwrap();

        let result = executor.run(&node).await.unwrap();
        let results = result.as_array().unwrap();
        assert_eq!(results[0], json!({"token": "T"}));

        assert_eq!(
            invoker.payload_sent_to("/b").unwrap(),
            json!({"b": 2, "token": "T"}).as_object().unwrap().clone()
        );
    }

    #[tokio::test]
    async fn test_pipe_never_overwrites_user_payload() {
        let (invoker, executor) =
            executor(ScriptedInvoker::default().respond("/a", json!({"a": 1})));

        let node = tree::load(&json!({
            "[+++]": [
                {"(://)": "/a"},
                {"(://)": "/b", "(.|.)": {"a": 9, "b": 2}},
            ],
        }))
        .unwrap();

        executor.run(&node).await.unwrap();
        assert_eq!(
            invoker.payload_sent_to("/b").unwrap(),
            json!({"a": 9, "b": 2}).as_object().unwrap().clone()
        );
    }

    #[tokio::test]
    async fn test_leaf_without_pipe_slot_ignores_pipe() {
        let (invoker, executor) =
            executor(ScriptedInvoker::default().respond("/a", json!({"a": 1})));

        let node = tree::load(&json!({
            "[+++]": [
                {"(://)": "/a"},
                {"(://)": "/b", "(...)": {"b": 2}},
            ],
        }))
        .unwrap();

        executor.run(&node).await.unwrap();
        assert_eq!(
            invoker.payload_sent_to("/b").unwrap(),
            json!({"b": 2}).as_object().unwrap().clone()
        );
    }

    #[tokio::test]
    async fn test_list_pipe_reduces_to_merged_dictionary() {
        let (invoker, executor) = executor(
            ScriptedInvoker::default()
                .respond("/a", json!({"a": 1}))
                .respond("/b", json!({"b": 2})),
        );

        // The parallel stage's result list merges into one pipe dictionary
        let node = tree::load(&json!({
            "[+++]": [
                {"[###]": [
                    {"(://)": "/a"},
                    {"(://)": "/b"},
                ]},
                {"(://)": "/c", "(.|.)": {}},
            ],
        }))
        .unwrap();

        executor.run(&node).await.unwrap();
        let payload = invoker.payload_sent_to("/c").unwrap();
        assert_eq!(payload.get("a"), Some(&json!(1)));
        assert_eq!(payload.get("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_parallel_results_in_completion_order() {
        let (_, executor) = executor(
            ScriptedInvoker::default()
                .respond("/slow", json!("slow"))
                .delay("/slow", Duration::from_millis(150))
                .respond("/fast", json!("fast")),
        );

        let node = tree::load(&json!({
            "[###]": [
                {"(://)": "/slow"},
                {"(://)": "/fast"},
            ],
        }))
        .unwrap();

        let result = executor.run(&node).await.unwrap();
        assert_eq!(result, json!(["fast", "slow"]));
    }

    #[tokio::test]
    async fn test_parallel_group_timeout() {
        let (_, executor) = executor(
            ScriptedInvoker::default()
                .delay("/a", Duration::from_millis(300))
                .delay("/b", Duration::from_millis(300)),
        );

        let node = tree::load(&json!({
            "[###]": [
                {"(://)": "/a"},
                {"(://)": "/b"},
            ],
            "(:!!)": 0.05,
        }))
        .unwrap();

        let started = Instant::now();
        let error = executor.run(&node).await.unwrap_err();
        assert!(matches!(error, GroupingError::GroupTimeout(_)));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_serial_group_timeout() {
        let (_, executor) =
            executor(ScriptedInvoker::default().delay("/a", Duration::from_millis(300)));

        let node = tree::load(&json!({
            "[+++]": [
                {"(://)": "/a"},
                {"(://)": "/b"},
            ],
            "(:!!)": 0.05,
        }))
        .unwrap();

        let error = executor.run(&node).await.unwrap_err();
        assert!(matches!(error, GroupingError::GroupTimeout(_)));
    }

    #[tokio::test]
    async fn test_all_branches_failing_aggregate_by_equality() {
        let (_, executor) = executor(
            ScriptedInvoker::default()
                .fail("/a", 500)
                .fail("/b", 500)
                .fail("/c", 500),
        );

        let node = tree::load(&json!({
            "[###]": [
                {"(://)": "/a"},
                {"(://)": "/b"},
                {"(://)": "/c"},
            ],
        }))
        .unwrap();

        let error = executor.run(&node).await.unwrap_err();
        let GroupingError::Aggregated(failure) = &error else {
            panic!("expected aggregated failure, got {error:?}");
        };
        // Identical failures collapse; every target is enumerated
        let all_targets: Vec<&String> =
            failure.groups().iter().flat_map(|g| &g.targets).collect();
        assert_eq!(all_targets.len(), 3);
        for target in ["/a", "/b", "/c"] {
            assert!(all_targets.iter().any(|t| t.ends_with(target)));
        }
    }

    #[tokio::test]
    async fn test_partial_failure_surfaces_only_failing_branches() {
        let (_, executor) = executor(
            ScriptedInvoker::default()
                .respond("/ok", json!("fine"))
                .fail("/bad", 502),
        );

        let node = tree::load(&json!({
            "[###]": [
                {"(://)": "/ok"},
                {"(://)": "/bad"},
            ],
        }))
        .unwrap();

        let error = executor.run(&node).await.unwrap_err();
        let GroupingError::Aggregated(failure) = &error else {
            panic!("expected aggregated failure, got {error:?}");
        };
        assert_eq!(failure.groups().len(), 1);
        assert_eq!(failure.groups()[0].targets, vec!["/bad"]);
    }

    #[tokio::test]
    async fn test_single_child_parallel_matches_serial() {
        let tree_parallel = tree::load(&json!({"[###]": [{"(://)": "/a"}]})).unwrap();
        let tree_serial = tree::load(&json!({"[+++]": [{"(://)": "/a"}]})).unwrap();

        let (_, executor1) =
            executor(ScriptedInvoker::default().respond("/a", json!({"r": 1})));
        let (_, executor2) =
            executor(ScriptedInvoker::default().respond("/a", json!({"r": 1})));

        let from_parallel = executor1.run(&tree_parallel).await.unwrap();
        let from_serial = executor2.run(&tree_serial).await.unwrap();
        assert_eq!(from_parallel, from_serial);
    }

    #[tokio::test]
    async fn test_pool_bounds_leaf_concurrency() {
        let (invoker, executor) = {
            let scripted = ScriptedInvoker::default()
                .delay("/a", Duration::from_millis(30))
                .delay("/b", Duration::from_millis(30))
                .delay("/c", Duration::from_millis(30));
            let invoker = Arc::new(scripted);
            (
                invoker.clone(),
                TaskExecutor::new(invoker.clone()).with_pool_size(1),
            )
        };

        let node = tree::load(&json!({
            "[###]": [
                {"(://)": "/a"},
                {"(://)": "/b"},
                {"(://)": "/c"},
            ],
        }))
        .unwrap();

        executor.run(&node).await.unwrap();
        assert_eq!(invoker.max_concurrent.load(Ordering::SeqCst), 1);
    }
}
