//! Loading of JSON task trees.
//!
//! A task tree composes remote REST calls into serial and parallel groups.
//! The node kind is distinguished by reserved keys; any user payload key
//! equal to a reserved key is treated as the structural tag, not as data.

use crate::errors::{GroupingError, Result};
use serde_json::{Map, Value};
use std::time::Duration;

pub const KEY_REST_URL: &str = "(://)";
pub const KEY_HEADERS: &str = "(:^:)";
pub const KEY_PAYLOAD: &str = "(...)";
pub const KEY_PAYLOAD_WITH_PIPE: &str = "(.|.)";
pub const KEY_TIMEOUT: &str = "(:!!)";
pub const KEY_SERIAL_GROUP: &str = "[+++]";
pub const KEY_PARALLEL_GROUP: &str = "[###]";

/// One REST call of a task tree.
#[derive(Clone, Debug, PartialEq)]
pub struct CallTask {
    pub target: String,
    pub headers: Option<Map<String, Value>>,
    pub payload: Map<String, Value>,
    /// Merge pipelined arguments into the payload before the call.
    pub with_pipe: bool,
    pub timeout: Option<Duration>,
}

/// A task tree node: a leaf REST call, or a serial/parallel group of child
/// nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskNode {
    Call(CallTask),
    Serial {
        children: Vec<TaskNode>,
        timeout: Option<Duration>,
    },
    Parallel {
        children: Vec<TaskNode>,
        timeout: Option<Duration>,
    },
}

/// Parses a JSON document into a task tree by recursive descent.
pub fn load(tree: &Value) -> Result<TaskNode> {
    let node = tree
        .as_object()
        .ok_or_else(|| malformed(tree))?;

    if let Some(target) = node
        .get(KEY_REST_URL)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
    {
        return load_call(node, target);
    }

    if let Some(children) = node.get(KEY_SERIAL_GROUP) {
        let children = load_children(children)?;
        return Ok(TaskNode::Serial {
            children,
            timeout: parse_timeout(node),
        });
    }

    if let Some(children) = node.get(KEY_PARALLEL_GROUP) {
        let mut children = load_children(children)?;
        // A parallel group of one child degrades to serial execution
        if children.len() == 1 {
            return Ok(TaskNode::Serial {
                children: vec![children.remove(0)],
                timeout: parse_timeout(node),
            });
        }
        return Ok(TaskNode::Parallel {
            children,
            timeout: parse_timeout(node),
        });
    }

    Err(malformed(tree))
}

fn load_call(node: &Map<String, Value>, target: &str) -> Result<TaskNode> {
    let mut payload = match node.get(KEY_PAYLOAD) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(GroupingError::MalformedNode(format!(
                "the {KEY_PAYLOAD:?} payload must be an object, got {other}"
            )));
        }
    };

    // The pipe slot both signals with-pipe and contributes to the payload
    let with_pipe = node.contains_key(KEY_PAYLOAD_WITH_PIPE);
    match node.get(KEY_PAYLOAD_WITH_PIPE) {
        None | Some(Value::Null) => {}
        Some(Value::Object(additions)) => {
            for (key, value) in additions {
                payload.insert(key.clone(), value.clone());
            }
        }
        Some(other) => {
            return Err(GroupingError::MalformedNode(format!(
                "the {KEY_PAYLOAD_WITH_PIPE:?} payload must be an object, got {other}"
            )));
        }
    }

    let headers = match node.get(KEY_HEADERS) {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(other) => {
            return Err(GroupingError::MalformedNode(format!(
                "the {KEY_HEADERS:?} header map must be an object, got {other}"
            )));
        }
    };

    Ok(TaskNode::Call(CallTask {
        target: target.to_string(),
        headers,
        payload,
        with_pipe,
        timeout: parse_timeout(node),
    }))
}

fn load_children(children: &Value) -> Result<Vec<TaskNode>> {
    let elements = children
        .as_array()
        .ok_or_else(|| malformed(children))?;
    if elements.is_empty() {
        return Err(GroupingError::EmptyGroup);
    }
    elements.iter().map(load).collect()
}

/// A timeout is taken only when numeric and positive.
fn parse_timeout(node: &Map<String, Value>) -> Option<Duration> {
    node.get(KEY_TIMEOUT)
        .and_then(Value::as_f64)
        .filter(|secs| *secs > 0.0)
        .map(Duration::from_secs_f64)
}

fn malformed(node: &Value) -> GroupingError {
    let mut repr = node.to_string();
    if repr.len() > 200 {
        repr.truncate(200);
        repr.push_str("...");
    }
    GroupingError::MalformedNode(repr)
}
