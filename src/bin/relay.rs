use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use alert_relay::{
    config::{Config, read_config_file},
    router::Router,
    service::{AlertService, spawn_signal_listener},
    sinks::{SinkResources, build_sinks},
    store::ElasticStore,
};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log level for this crate (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    // the binary and the library share the `alert_relay` target
    let filter = filter::Targets::new().with_target("alert_relay", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = read_config_file(&args.file)?;

    let resources = SinkResources::from_config(&config);
    let sinks = build_sinks(&config.notification_methods, &resources);
    let router = Arc::new(Router::from_notificators(&config.notificators, &sinks));
    info!(
        "loaded {} notification method(s) and {} notificator(s)",
        sinks.len(),
        router.len()
    );

    let service = AlertService::new(
        Arc::new(ElasticStore::new(config.store.clone())),
        router.clone(),
        &config.monitors,
        Duration::from_secs(config.polling_interval),
    )
    .with_bot_connection(resources.bot_connection.clone());

    start_api(&config, router, &service).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    info!(
        "watching {} index(es) every {}s",
        service.targets().len(),
        config.polling_interval
    );

    service.run(shutdown_rx).await?;
    info!("alert relay stopped");

    Ok(())
}

#[cfg(feature = "api")]
async fn start_api(
    config: &Config,
    router: Arc<Router>,
    service: &AlertService,
) -> anyhow::Result<()> {
    use alert_relay::api::{ApiState, spawn_api_server};

    if let Some(settings) = config.api.clone() {
        let state = ApiState::new(router).with_service_state(service.subscribe_state());
        spawn_api_server(settings, state).await?;
    }

    Ok(())
}

#[cfg(not(feature = "api"))]
async fn start_api(
    config: &Config,
    _router: Arc<Router>,
    _service: &AlertService,
) -> anyhow::Result<()> {
    if config.api.is_some() {
        tracing::warn!("api section configured but the api feature is disabled");
    }
    Ok(())
}
