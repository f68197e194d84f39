use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use std::error::Error;
use std::path::PathBuf;
use switchboard::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchboard", about = "REST procedure dispatch and task grouping service")]
struct Cli {
    #[arg(long)]
    config_file_path: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config_file_path.as_deref())?;
    config.apply_env();

    // Keep the guard alive for the lifetime of the process
    let _sentry_guard = config.logging.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    if let Some(statsd_host) = config.metrics.statsd_host.clone() {
        install_statsd_exporter(&statsd_host, config.metrics.statsd_port)?;
    }
    shared::metrics_defs::describe_all(dispatch::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(grouping::metrics_defs::ALL_METRICS);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(switchboard::run(config))?;

    Ok(())
}

fn install_statsd_exporter(host: &str, port: u16) -> Result<(), Box<dyn Error>> {
    let recorder = StatsdBuilder::from(host, port).build(Some("switchboard"))?;
    metrics::set_global_recorder(recorder)?;
    Ok(())
}
