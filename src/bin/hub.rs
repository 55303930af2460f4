use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use servicewatch::{
    api::{self, ApiConfig, ApiState},
    config::{Config, read_config_file},
    events::EventBus,
    hub::{Hub, HubConfig},
    monitor::{Monitor, MonitorTarget},
    notifier::{self, NotifierManager},
    providers::HttpAgentProvider,
    util::bind_addr,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

/// `servicewatch` also covers this binary's own `servicewatch_hub` target
fn log_filter() -> filter::Targets {
    filter::Targets::new().with_targets(vec![
        ("servicewatch", LevelFilter::DEBUG),
        ("tower_http", LevelFilter::INFO),
    ])
}

fn init() {
    let filter = log_filter();
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

fn targets(config: &Config) -> Vec<MonitorTarget> {
    let timeout = Duration::from_secs(config.monitor.timeout as u64);
    config
        .hosts
        .iter()
        .map(|host| {
            let provider = Arc::new(HttpAgentProvider::from_config(host, timeout));
            MonitorTarget::new(host.name.clone(), provider, host.mode)
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let bus = EventBus::new(config.monitor.dispatch);

    let manager = NotifierManager::new(&bus);
    for notifier in &config.notifiers {
        manager.register(notifier::from_config(notifier));
    }

    let hub = Hub::new(bus.clone(), HubConfig::default());
    hub.start();

    let monitor = Monitor::new(targets(&config), bus.clone(), config.monitor.monitor_config())?;

    let api_config = ApiConfig {
        bind_addr: bind_addr(config.api.bind),
        auth_token: config.api.token.clone(),
        enable_cors: config.api.enable_cors,
    };
    let server_shutdown = CancellationToken::new();
    let router = api::router(&api_config, ApiState::new(hub.clone()));
    let addr = api::spawn_api_server(api_config.bind_addr, router, server_shutdown.clone()).await?;

    monitor.start()?;
    info!(
        "monitoring {} host(s), {} notifier(s), streaming on ws://{addr}/api/v1/stream",
        config.hosts.len(),
        manager.notifier_count()
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    monitor.stop().await;
    hub.stop().await;
    server_shutdown.cancel();
    if let Err(e) = manager.close().await {
        error!("failed to close notifiers: {e}");
    }

    Ok(())
}
