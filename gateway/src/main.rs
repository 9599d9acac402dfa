use admission::RateLimiter;
use aggregator::{Aggregator, HttpDirectory};
use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use outbound::{OutboundClient, PoolSettings, ProxyPool};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod api;
mod config;

/// Extra proxy endpoints, comma separated, merged into the pool after the
/// file-based list.
const PROXY_ENV_VAR: &str = "GATEWAY_PROXIES";

#[derive(Parser)]
#[command(about = "User profile aggregation gateway")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "gateway.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_file(&cli.config)?;

    if let Some(metrics_config) = &config.metrics {
        let recorder = StatsdBuilder::from(
            metrics_config.statsd_host.as_str(),
            metrics_config.statsd_port,
        )
        .build(Some("gateway"))?;
        metrics::set_global_recorder(recorder)
            .map_err(|e| format!("failed to install metrics recorder: {e}"))?;
    }

    let pool = Arc::new(ProxyPool::new(PoolSettings {
        enabled: config.proxy.use_proxies,
        max_failures: config.proxy.max_failures,
        blacklist_window: Duration::from_secs(config.proxy.blacklist_time),
        direct_fallback: config.proxy.direct_fallback,
        ..PoolSettings::default()
    }));

    if config.proxy.use_proxies {
        match config::load_proxy_file(&config.proxy.proxy_file) {
            Ok(endpoints) => add_endpoints(&pool, endpoints),
            Err(e) => tracing::warn!(
                file = %config.proxy.proxy_file.display(),
                error = %e,
                "could not read proxy file, starting with an empty pool"
            ),
        }

        if let Ok(raw) = std::env::var(PROXY_ENV_VAR) {
            add_endpoints(&pool, config::split_proxy_list(&raw));
        }

        tracing::info!(endpoints = pool.len(), "proxy rotation enabled");
    }

    let outbound_client = OutboundClient::new(pool)?;
    let directory = Arc::new(HttpDirectory::new(outbound_client));
    let state = api::AppState {
        aggregator: Arc::new(Aggregator::new(directory)),
        limiter: Arc::new(RateLimiter::new(
            config.api.enable_rate_limit,
            config.api.rate_limit,
        )),
    };

    let app = api::router(state);
    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn add_endpoints(pool: &ProxyPool, endpoints: Vec<String>) {
    for endpoint in endpoints {
        if let Err(e) = pool.add_endpoint(&endpoint) {
            tracing::warn!(endpoint, error = %e, "skipping proxy endpoint");
        }
    }
}
