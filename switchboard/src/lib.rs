pub mod config;
pub mod json_formatter;
pub mod samples;

use config::Config;
use dispatch::format::FormatterRegistry;
use dispatch::service::DispatchService;
use dispatch::DispatchError;
use grouping::RestInvoker;
use json_formatter::JsonFormatter;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

/// Wires the service together from its configuration and serves until ctrl-c.
pub async fn run(config: Config) -> Result<(), DispatchError> {
    let invoker = Arc::new(build_invoker(&config)?);
    let registry = samples::build_registry(&config, invoker);

    let mut formatters = FormatterRegistry::new();
    formatters.register(Arc::new(JsonFormatter), true);

    let service = DispatchService::new(registry, formatters, config.dispatch.clone());
    let admin_service: AdminService<_, DispatchError> = AdminService::new(|| true);

    let dispatch_task = run_http_service(&config.listener.host, config.listener.port, service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        "Starting switchboard"
    );

    tokio::select! {
        result = async { tokio::try_join!(dispatch_task, admin_task) } => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down switchboard...");
        }
    }

    Ok(())
}

fn build_invoker(config: &Config) -> Result<RestInvoker, DispatchError> {
    let base_url = match &config.grouping.base_url {
        Some(base) => base.clone(),
        None => format!(
            "http://{}:{}/",
            config.listener.host, config.listener.port
        ),
    };
    let base_url = url::Url::parse(&base_url)
        .map_err(|e| DispatchError::InternalError(format!("invalid grouping base URL: {e}")))?;
    Ok(RestInvoker::new().with_base_url(base_url))
}
