//! The HTTP edge of the dispatch engine.
//!
//! Routes `/whoami` and `<mount_prefix>/<app>/<func_path>` requests through
//! the full pipeline: identity extraction, CORS, path resolution, argument
//! merging, scoped handler loading, invocation and response formatting.

use crate::arguments::RequestArguments;
use crate::config::DispatchConfig;
use crate::errors::{DispatchError, Result};
use crate::format::FormatterRegistry;
use crate::handlers::HandlerRegistry;
use crate::metrics_defs;
use crate::{invoke, path, scope};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::Value;
use shared::http::make_boxed_error_response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct DispatchService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    registry: HandlerRegistry,
    formatters: FormatterRegistry,
    config: DispatchConfig,
}

impl DispatchService {
    pub fn new(
        registry: HandlerRegistry,
        formatters: FormatterRegistry,
        config: DispatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                registry,
                formatters,
                config,
            }),
        }
    }
}

impl Service<Request<Incoming>> for DispatchService {
    type Response = Response<BoxBody<Bytes, DispatchError>>;
    type Error = DispatchError;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move {
            let started = Instant::now();
            metrics::gauge!(metrics_defs::REQUESTS_INFLIGHT.name).increment(1.0);

            let response = inner.handle(req).await.unwrap_or_else(|error| {
                let status = error.status_code();
                if status.is_server_error() {
                    tracing::error!(%error, %status, "Request failed");
                } else {
                    tracing::debug!(%error, %status, "Request rejected");
                }
                metrics::counter!(
                    metrics_defs::DISPATCH_ERRORS.name,
                    "status" => status.as_u16().to_string()
                )
                .increment(1);
                error.into_response()
            });

            metrics::gauge!(metrics_defs::REQUESTS_INFLIGHT.name).decrement(1.0);
            metrics::histogram!(
                metrics_defs::REQUEST_DURATION.name,
                "status" => response.status().as_u16().to_string()
            )
            .record(started.elapsed().as_secs_f64());

            Ok(response)
        })
    }
}

impl ServiceInner {
    async fn handle(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, DispatchError>>> {
        let user = basic_auth_user(req.headers());
        if user.is_none() && !self.config.disable_auth {
            return Err(DispatchError::Unauthorized);
        }

        let mut cors_headers = HeaderMap::new();
        if shared::cors::enable_cors(&req, &mut cors_headers) {
            let mut response = Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(empty_body())
                .map_err(|e| DispatchError::InternalError(e.to_string()))?;
            response.headers_mut().extend(cors_headers);
            return Ok(response);
        }

        let path = req.uri().path().to_string();
        let accept = header_string(req.headers(), ACCEPT.as_str());

        if path == "/whoami"
            && (req.method() == Method::GET
                || req.method() == Method::POST
                || req.method() == Method::OPTIONS)
        {
            let identity = user.clone().map(Value::String).unwrap_or(Value::Null);
            return self.respond(&identity, accept.as_deref(), cors_headers);
        }

        let Some((app, func_path)) = split_mounted_path(&path, &self.config.mount_prefix) else {
            return Ok(make_boxed_error_response(StatusCode::NOT_FOUND));
        };

        if !self.check_permission(app, user.as_deref(), func_path) {
            return Err(DispatchError::Unauthorized);
        }

        let query = req.uri().query().map(str::to_string);
        let func_path = func_path.to_string();

        let body_bytes = req
            .into_body()
            .collect()
            .await
            .map_err(|e| DispatchError::RequestBodyError(e.to_string()))?
            .to_bytes();
        let body_json: Option<Value> = if body_bytes.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&body_bytes)
                    .map_err(|e| DispatchError::RequestBodyError(e.to_string()))?,
            )
        };

        let mut arguments = RequestArguments::new(body_json.as_ref(), query.as_deref());
        // The authenticated principal always wins over client-supplied values
        arguments.override_value(
            "actual_username",
            user.map(Value::String).unwrap_or(Value::Null),
        );

        let resolved = path::resolve(&self.config.script_root, &func_path)?;
        tracing::debug!(
            directory = %resolved.request.directory,
            handler_set = %resolved.request.handler_set,
            procedure = %resolved.request.procedure,
            "Resolved function path"
        );

        let scope = scope::load_handler_set(
            &self.registry,
            &resolved.absolute_directory,
            &resolved.request.handler_set,
        )
        .await?;

        let outcome = invoke::invoke(
            scope.handler_set(),
            &resolved.request.procedure,
            arguments.into_form(),
        )
        .await;

        // The scope is torn down before any error propagates
        scope.release();
        let value = outcome?;

        self.respond(&value, accept.as_deref(), cors_headers)
    }

    fn respond(
        &self,
        value: &Value,
        accept: Option<&str>,
        cors_headers: HeaderMap,
    ) -> Result<Response<BoxBody<Bytes, DispatchError>>> {
        let (content, media_type) = self.formatters.respond_as(value, accept)?;

        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, media_type)
            .body(Full::new(content).map_err(|e| match e {}).boxed())
            .map_err(|e| DispatchError::InternalError(e.to_string()))?;
        response.headers_mut().extend(cors_headers);
        Ok(response)
    }

    /// Per-application permission hook; the application id is opaque to the
    /// dispatch core.
    // TODO: let deployments plug in a real permission backend here
    fn check_permission(&self, _app: &str, _user: Option<&str>, _func_path: &str) -> bool {
        true
    }
}

fn empty_body() -> BoxBody<Bytes, DispatchError> {
    Full::new(Bytes::new()).map_err(|e| match e {}).boxed()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Splits `<mount_prefix>/<app>/<func_path>` into the application id and the
/// function path suffix.
fn split_mounted_path<'a>(path: &'a str, mount_prefix: &str) -> Option<(&'a str, &'a str)> {
    let suffix = path.strip_prefix(mount_prefix)?;
    let suffix = suffix.strip_prefix('/')?;
    let (app, func_path) = suffix.split_once('/')?;
    if app.is_empty() {
        return None;
    }
    Some((app, func_path))
}

/// Extracts the user name from a Basic Authorization header.
fn basic_auth_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, payload) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let user = decoded.split(':').next()?;
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}
