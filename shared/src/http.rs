use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::timeout;

pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    let service_arc = Arc::new(service);

    loop {
        let (stream, _peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            let _ = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await;
        });
    }
}

/// Builds a plain-text error response with the status's canonical reason.
pub fn make_error_response(status_code: StatusCode) -> Response<Bytes> {
    let message = status_code.canonical_reason().unwrap_or("an error occurred");

    Response::builder()
        .status(status_code)
        .body(Bytes::from(format!("{message}\n")))
        .unwrap_or_else(|_| {
            let mut res = Response::new(Bytes::from("Internal server error\n"));
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            res
        })
}

/// Boxed-body variant of [`make_error_response`] for hyper services.
pub fn make_boxed_error_response<E>(status_code: StatusCode) -> Response<BoxBody<Bytes, E>> {
    let (parts, body) = make_error_response(status_code).into_parts();
    Response::from_parts(parts, Full::new(body).map_err(|e| match e {}).boxed())
}

/// Send a JSON request to a single downstream target with configurable timeout.
///
/// The body is sent as-is; `Content-Type: application/json; charset=utf-8` is
/// added unless the caller supplied its own. The timeout covers the complete
/// request/response cycle, including collecting the response body, so this is
/// not suitable for streaming responses.
pub async fn send_json<C>(
    client: &Client<C, Full<Bytes>>,
    method: Method,
    target: &url::Url,
    headers: Option<&HeaderMap>,
    body: Bytes,
    call_timeout: Option<Duration>,
) -> Result<Response<Bytes>, UpstreamError>
where
    C: hyper_util::client::legacy::connect::Connect + Clone + Send + Sync + 'static,
{
    // Use host as identifier for error messages
    let target_identifier = target.host_str().unwrap_or(target.as_str()).to_string();

    let mut req_builder = Request::builder().method(method).uri(target.as_str());

    let mut has_content_type = false;
    if let Some(extra) = headers {
        for (name, value) in extra.iter() {
            if name == CONTENT_TYPE {
                has_content_type = true;
            }
            req_builder = req_builder.header(name, value);
        }
    }
    if !has_content_type {
        req_builder = req_builder.header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
    }

    let request = req_builder.body(Full::new(body)).map_err(|e| {
        UpstreamError::InternalError(format!("Failed to build request: {e}"))
    })?;

    tracing::debug!(target = %target_identifier, "Sending JSON request");

    let in_flight = client.request(request);
    let response = match call_timeout {
        Some(duration) => timeout(duration, in_flight)
            .await
            .map_err(|_| UpstreamError::Timeout(target_identifier.clone()))?,
        None => in_flight.await,
    }
    .map_err(|e| UpstreamError::RequestFailed(target_identifier.clone(), e.to_string()))?;

    // Collect response body bytes
    let (parts, body) = response.into_parts();
    let body_bytes = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| UpstreamError::ResponseBodyError(e.to_string()))?;

    Ok(Response::from_parts(parts, body_bytes))
}

/// Errors that can occur while talking to a downstream target
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Failed to read response body: {0}")]
    ResponseBodyError(String),

    #[error("Call timeout for {0}")]
    Timeout(String),

    #[error("Request failed for {0}: {1}")]
    RequestFailed(String, String),

    #[error("Internal error: {0}")]
    InternalError(String),
}
