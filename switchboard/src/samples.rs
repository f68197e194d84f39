//! Sample handler sets shipped with the service.
//!
//! `test_directory/test_module` mirrors the demo module of the original
//! deployment; `services_grouping/rest_grouping` exposes the task-grouping
//! orchestrator as an ordinary procedure, so a single REST call can fan out
//! a whole tree of downstream calls.

use crate::config::Config;
use dispatch::binder::{ParameterDescriptor, ParameterKind};
use dispatch::handlers::{HandlerRegistry, HandlerSet};
use grouping::Invoker;
use serde_json::{Value, json};
use shared::failure::ServiceFailure;
use std::sync::Arc;

pub fn build_registry(config: &Config, invoker: Arc<dyn Invoker>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new(&config.dispatch.script_root);
    registry.register("test_directory", test_module());
    registry.register(
        "services_grouping",
        rest_grouping(invoker, config.grouping.worker_pool_size),
    );
    registry
}

fn test_module() -> HandlerSet {
    HandlerSet::new("test_module")
        .procedure(
            "module_level_function",
            vec![
                ParameterDescriptor::required("arg1", ParameterKind::PositionalOrNamed),
                ParameterDescriptor::required("arg11", ParameterKind::PositionalOrNamed),
                ParameterDescriptor::required("arg12", ParameterKind::PositionalOrNamed),
                ParameterDescriptor::with_default(
                    "arg2",
                    ParameterKind::PositionalOrNamed,
                    json!("default"),
                ),
                ParameterDescriptor::with_default("arg3", ParameterKind::NamedOnly, json!(3.14)),
                ParameterDescriptor::required("kwargs", ParameterKind::VariadicNamed),
            ],
            |args| async move {
                let arg1 = args.get("arg1").and_then(Value::as_f64).unwrap_or(0.0);
                let arg3 = args.get("arg3").and_then(Value::as_f64).unwrap_or(0.0);
                Ok(json!({
                    "result1": (arg1 * arg3).to_string(),
                    "arg2": args.get("arg2"),
                    "other kws": args.get("kwargs"),
                }))
            },
        )
        .value("test_var1", json!(0.618))
}

fn rest_grouping(invoker: Arc<dyn Invoker>, worker_pool_size: usize) -> HandlerSet {
    HandlerSet::new("rest_grouping").procedure(
        "start",
        vec![ParameterDescriptor::required(
            "rest",
            ParameterKind::PositionalOrNamed,
        )],
        move |args| {
            let invoker = invoker.clone();
            async move {
                let tree = args
                    .get("rest")
                    .cloned()
                    .ok_or("the task tree argument is missing")?;

                grouping::start(&tree, invoker, worker_pool_size)
                    .await
                    .map_err(|error| {
                        Box::new(ServiceFailure::new(error.status_code(), error.to_string()))
                            as Box<dyn std::error::Error + Send + Sync>
                    })
            }
        },
    )
}
