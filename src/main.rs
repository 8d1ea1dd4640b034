// =============================================================================
// Sentinel Radar — Main Entry Point
// =============================================================================
//
// Real-time anomaly detection over a liquidation/whale-trade feed: subscribes
// to the upstream WebSocket feed, maintains rolling per-symbol windows, scans
// them on a fixed cadence for liquidation storms and whale clusters, and
// dispatches alerts to one or more chat sinks.
// =============================================================================

mod aggregator;
mod alert;
mod auth;
mod config;
mod detectors;
mod error;
mod feed;
mod runner;
mod scoring;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::alert::{AlertEngine, ChatSink, TelegramSink};
use crate::config::AppConfig;
use crate::runner::Runner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("sentinel-radar starting up");

    let config = match AppConfig::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "invalid configuration, aborting startup");
            return Err(e);
        }
    };

    info!(
        chat_ids = config.chat_sink_chat_ids.len(),
        ws_url = %config.feed_ws_url,
        "configuration loaded"
    );

    let sinks: Vec<Arc<dyn ChatSink>> = vec![Arc::new(TelegramSink::new(config.chat_sink_token.clone()))];
    let alert_engine = Arc::new(AlertEngine::new(config.clone(), sinks));

    let runner = Runner::new(config, alert_engine);
    runner.run().await
}
