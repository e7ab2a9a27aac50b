//! Activity Pulse
//!
//! Activity feed pipeline handling:
//! - Periodic polling of the upstream event feed with idempotent persistence
//! - Bounded dispatch of metadata refreshes to a fixed worker pool
//! - Live fan-out of refreshed metadata over server-sent events
//! - Hourly and daily rollups by category, tag and language

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use validator::Validate;

use api::{router, AppState};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig};
use telemetry::{init_tracing, TracingConfig};
use upstream::{SourceClient, UpstreamConfig};
use worker::{BroadcastHub, PipelineConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    logging: TracingConfig,

    #[serde(default)]
    upstream: UpstreamConfig,

    #[serde(default)]
    pipeline: PipelineConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logging: TracingConfig::default(),
            upstream: UpstreamConfig::default(),
            pipeline: PipelineConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection before any TLS use
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config()?;

    init_tracing(&config.logging);

    info!("Starting Activity Pulse v{}", env!("CARGO_PKG_VERSION"));

    config
        .upstream
        .validate()
        .context("Invalid upstream configuration")?;
    config
        .clickhouse
        .validate()
        .context("Invalid ClickHouse configuration")?;
    let worker_config = config
        .pipeline
        .to_worker_config()
        .context("Invalid pipeline configuration")?;

    info!(
        upstream = ?config.upstream,
        clickhouse_url = %config.clickhouse.url,
        database = %config.clickhouse.database,
        "Loaded configuration"
    );

    let source =
        Arc::new(SourceClient::new(&config.upstream).context("Failed to create upstream client")?);
    let clickhouse = Arc::new(ClickHouseClient::new(config.clickhouse.clone()));

    if config.clickhouse.init_schema {
        if let Err(e) = clickhouse_client::health::init_schema(&clickhouse).await {
            error!("Failed to initialize ClickHouse schema: {}", e);
            // Continue anyway - schema might already exist
        }
    }

    check_health(&source, &clickhouse).await;

    let hub = BroadcastHub::new(config.pipeline.subscriber_capacity);

    let scheduler = Arc::new(WorkerScheduler::new(
        worker_config,
        source.clone(),
        clickhouse.clone(),
        hub.clone(),
    ));
    let worker_handles = scheduler.clone().start();

    let state = AppState::new(clickhouse.clone(), hub.clone())
        .with_snapshot_size(config.pipeline.snapshot_size);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Open streams only end once the hub closes, so close it as soon as the
    // signal arrives or graceful shutdown would wait on them forever.
    let stream_hub = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            stream_hub.close();
        })
        .await
        .context("Server error")?;

    info!("Shutting down...");

    if !scheduler.shutdown(worker_handles).await {
        warn!("Some background tasks did not stop in time and were aborted");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PULSE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // List-valued and underscored fields don't round-trip through the
    // config crate's environment source, so read them directly.
    if let Ok(credentials) = std::env::var("PULSE_UPSTREAM_CREDENTIALS") {
        config.upstream.credentials = credentials
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(base_url) = std::env::var("PULSE_UPSTREAM_BASE_URL") {
        config.upstream.base_url = base_url;
    }

    if let Ok(url) = std::env::var("PULSE_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("PULSE_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("PULSE_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("PULSE_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    if let Ok(json) = std::env::var("LOG_JSON") {
        config.logging = config
            .logging
            .with_json(matches!(json.as_str(), "1" | "true"));
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(source: &SourceClient, clickhouse: &ClickHouseClient) {
    if upstream::health::check_connection(source).await {
        info!("Upstream connection: healthy");
    } else {
        error!("Upstream connection: unhealthy");
    }

    if clickhouse_client::health::check_connection(clickhouse).await {
        info!("ClickHouse connection: healthy");
    } else {
        error!("ClickHouse connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
