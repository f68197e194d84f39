//! End-to-end orchestration through the HTTP edge: a dispatched procedure
//! call fans a task tree out over downstream services.

use dispatch::format::FormatterRegistry;
use dispatch::service::DispatchService;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper::service::service_fn;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use switchboard::config::Config;
use switchboard::json_formatter::JsonFormatter;
use switchboard::samples;
use tokio::net::TcpListener;

/// Downstream mock: `/a` returns a token, `/b` echoes its payload, `/slow`
/// answers after a delay.
async fn start_downstream() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let service = service_fn(|req: Request<hyper::body::Incoming>| async {
                    let path = req.uri().path().to_string();
                    let body = req.into_body().collect().await.unwrap().to_bytes();
                    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

                    let response = match path.as_str() {
                        "/a" => json!({"token": "T"}),
                        "/b" => json!({"b_received": payload}),
                        "/slow" => {
                            tokio::time::sleep(Duration::from_millis(500)).await;
                            json!({"slow": true})
                        }
                        other => json!({"path": other}),
                    };
                    Ok::<_, Infallible>(hyper::Response::new(Full::new(Bytes::from(
                        serde_json::to_vec(&response).unwrap(),
                    ))))
                });

                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

/// Starts the dispatch service with the sample handler sets, targeting the
/// given downstream for relative task URLs.
async fn start_switchboard(downstream_port: u16) -> (tempfile::TempDir, u16) {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("test_directory")).unwrap();
    std::fs::create_dir_all(root.path().join("services_grouping")).unwrap();

    let mut config = Config::default();
    config.dispatch.script_root = root.path().to_path_buf();
    config.dispatch.disable_auth = true;
    config.grouping.base_url = Some(format!("http://127.0.0.1:{downstream_port}/"));

    let invoker = Arc::new(
        grouping::RestInvoker::new().with_base_url(
            url::Url::parse(config.grouping.base_url.as_ref().unwrap()).unwrap(),
        ),
    );
    let registry = samples::build_registry(&config, invoker);

    let mut formatters = FormatterRegistry::new();
    formatters.register(Arc::new(JsonFormatter), true);

    let service = DispatchService::new(registry, formatters, config.dispatch.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let svc = service.clone();

            tokio::spawn(async move {
                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, svc)
                    .await;
            });
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (root, port)
}

async fn post_tree(port: u16, tree: Value) -> (StatusCode, Value) {
    let client: Client<HttpConnector, Full<Bytes>> =
        Client::builder(TokioExecutor::new()).build(HttpConnector::new());

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!(
            "http://127.0.0.1:{port}/pys/app/services_grouping/rest_grouping.start"
        ))
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(
            serde_json::to_vec(&json!({"rest": tree})).unwrap(),
        )))
        .unwrap();

    let response = client.request(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

#[tokio::test]
async fn test_serial_pipeline_over_http() {
    let downstream = start_downstream().await;
    let (_root, port) = start_switchboard(downstream).await;

    let (status, value) = post_tree(
        port,
        json!({
            "[+++]": [
                {"(://)": "/a", "(...)": {}},
                {"(://)": "/b", "(.|.)": {}},
            ],
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value,
        json!([{"token": "T"}, {"b_received": {"token": "T"}}])
    );
}

#[tokio::test]
async fn test_parallel_fan_out_over_http() {
    let downstream = start_downstream().await;
    let (_root, port) = start_switchboard(downstream).await;

    let (status, value) = post_tree(
        port,
        json!({
            "[###]": [
                {"(://)": "/a"},
                {"(://)": "/x"},
                {"(://)": "/y"},
            ],
            "(:!!)": 5,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = value.as_array().unwrap();
    assert_eq!(results.len(), 3);
    // Completion order, so membership is what can be asserted
    assert!(results.contains(&json!({"token": "T"})));
    assert!(results.contains(&json!({"path": "/x"})));
    assert!(results.contains(&json!({"path": "/y"})));
}

#[tokio::test]
async fn test_group_timeout_maps_to_504() {
    let downstream = start_downstream().await;
    let (_root, port) = start_switchboard(downstream).await;

    let (status, value) = post_tree(
        port,
        json!({
            "[###]": [
                {"(://)": "/slow"},
                {"(://)": "/slow"},
            ],
            "(:!!)": 0.1,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(value.as_str().unwrap().contains("group timeout"));
}

#[tokio::test]
async fn test_malformed_tree_maps_to_400() {
    let downstream = start_downstream().await;
    let (_root, port) = start_switchboard(downstream).await;

    let (status, _) = post_tree(port, json!({"no": "tags"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
