//! The REST invoker behind task leaves.
//!
//! Wraps the outbound JSON call into the shape the executor needs: POST the
//! payload as JSON, decode a JSON response (falling back to text), and turn
//! non-success statuses into downstream failures that keep the upstream
//! status.

use crate::errors::{GroupingError, Result};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Issues one remote call for a task leaf.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        target: &str,
        headers: Option<&Map<String, Value>>,
        payload: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value>;
}

/// JSON-over-HTTP invoker. Relative targets are resolved against the
/// configured base URL.
pub struct RestInvoker {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: Option<Url>,
}

impl Default for RestInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl RestInvoker {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn resolve_target(&self, target: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(target) {
            return Ok(url);
        }
        match &self.base_url {
            Some(base) => base.join(target).map_err(|e| {
                GroupingError::Internal(format!("invalid call target {target:?}: {e}"))
            }),
            None => Err(GroupingError::Internal(format!(
                "relative call target {target:?} needs a configured base URL"
            ))),
        }
    }
}

#[async_trait]
impl Invoker for RestInvoker {
    async fn invoke(
        &self,
        target: &str,
        headers: Option<&Map<String, Value>>,
        payload: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let url = self.resolve_target(target)?;
        let target_name = url.to_string();

        let body = Bytes::from(serde_json::to_vec(payload).map_err(|e| {
            GroupingError::Internal(format!("failed to serialize payload: {e}"))
        })?);

        let header_map = headers.map(to_header_map).transpose()?;

        let response = shared::http::send_json(
            &self.client,
            Method::POST,
            &url,
            header_map.as_ref(),
            body,
            timeout,
        )
        .await
        .map_err(|source| GroupingError::Transport {
            target: target_name.clone(),
            source,
        })?;

        let status = response.status();
        let body = response.into_body();
        let decoded: Value = serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));

        if !status.is_success() {
            return Err(GroupingError::Downstream {
                target: target_name,
                status: status.as_u16(),
                detail: extract_error_detail(&decoded),
            });
        }

        Ok(decoded)
    }
}

fn to_header_map(headers: &Map<String, Value>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let name = HeaderName::try_from(name.as_str()).map_err(|e| {
            GroupingError::Internal(format!("invalid header name {name:?}: {e}"))
        })?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| GroupingError::Internal(format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Pulls a human-readable error message out of a failure body where the
/// downstream service provides one.
fn extract_error_detail(body: &Value) -> String {
    for key in ["ExceptionMessage", "message", "error"] {
        if let Some(detail) = body.get(key).and_then(Value::as_str) {
            return detail.to_string();
        }
    }
    let mut detail = body.to_string();
    if detail.len() > 200 {
        detail.truncate(200);
        detail.push_str("...");
    }
    detail
}
