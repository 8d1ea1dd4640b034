// =============================================================================
// Runner / Scheduler — owns the feed client and the three periodic detection
// loops, and drives orderly startup and shutdown.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::aggregator::EventAggregator;
use crate::alert::AlertEngine;
use crate::config::AppConfig;
use crate::detectors::{ClusterDetector, GlobalRadar, StormDetector};
use crate::feed::FeedClient;
use crate::scoring::ScoringEngine;

const DETECTION_TICK: Duration = Duration::from_secs(5);
const ACTIVE_SYMBOL_WINDOW_SEC: u64 = 30;
const MEMORY_SWEEP_TICK: Duration = Duration::from_secs(60);
const COOLDOWN_SWEEP_TICK: Duration = Duration::from_secs(3600);

const LIQUIDATION_ORDERS_CHANNEL: &str = "liquidationOrders";
const DEFAULT_TRADE_EXCHANGE: &str = "Binance";
const DEFAULT_TRADE_SYMBOL: &str = "BTCUSDT";
const DEFAULT_TRADE_USD_THRESHOLD: u64 = 10_000;

fn futures_trades_channel(exchange: &str, symbol: &str, usd_threshold: u64) -> String {
    format!("futures_trades@{exchange}@{symbol}@{usd_threshold}")
}

pub struct Runner {
    config: Arc<AppConfig>,
    aggregator: Arc<EventAggregator>,
    alert_engine: Arc<AlertEngine>,
    storm: Arc<StormDetector>,
    cluster: Arc<ClusterDetector>,
    // Global Radar re-checks storm/cluster qualification on its own cadence
    // and cooldown (see compose()'s admission bar); it needs its own
    // detector instances so its cooldown-gated detect() calls don't starve
    // against (or be starved by) the standalone LIQ_STORM/WHALE_CLUSTER loops
    // sharing the same per-symbol cooldown state.
    radar_storm: Arc<StormDetector>,
    radar_cluster: Arc<ClusterDetector>,
    radar: Arc<GlobalRadar>,
    scoring: Arc<ScoringEngine>,
}

impl Runner {
    pub fn new(config: Arc<AppConfig>, alert_engine: Arc<AlertEngine>) -> Self {
        Self {
            aggregator: Arc::new(EventAggregator::new(config.aggregator_max_memory_mb)),
            config,
            alert_engine,
            storm: Arc::new(StormDetector::new()),
            cluster: Arc::new(ClusterDetector::new()),
            radar_storm: Arc::new(StormDetector::new()),
            radar_cluster: Arc::new(ClusterDetector::new()),
            radar: Arc::new(GlobalRadar::new()),
            scoring: Arc::new(ScoringEngine::new()),
        }
    }

    /// Run every subsystem until a ctrl-c signal is received.
    pub async fn run(self) -> anyhow::Result<()> {
        let channels: Vec<String> = vec![
            LIQUIDATION_ORDERS_CHANNEL.to_string(),
            futures_trades_channel(DEFAULT_TRADE_EXCHANGE, DEFAULT_TRADE_SYMBOL, DEFAULT_TRADE_USD_THRESHOLD),
        ];
        let feed = Arc::new(FeedClient::new(
            self.config.feed_ws_url.clone(),
            self.config.feed_api_key.clone(),
            channels,
            self.aggregator.clone(),
            self.alert_engine.clone(),
            self.config.ws_ping_interval_sec,
            self.config.ws_min_ping_interval_sec,
            self.config.ws_max_ping_interval_sec,
            self.config.ws_pong_timeout_sec,
        ));

        self.alert_engine
            .send_startup_message("sentinel-radar starting up")
            .await;

        let feed_task = tokio::spawn({
            let feed = feed.clone();
            async move {
                if let Err(e) = feed.run().await {
                    error!(error = %e, "feed client terminated");
                }
            }
        });

        let storm_task = tokio::spawn(self.clone_for_storm_loop());
        let cluster_task = tokio::spawn(self.clone_for_cluster_loop());
        let radar_task = tokio::spawn(self.clone_for_radar_loop());
        let housekeeping_task = tokio::spawn(self.clone_for_housekeeping_loop());

        info!("all subsystems running, press ctrl-c to stop");
        tokio::signal::ctrl_c().await?;
        warn!("shutdown signal received, stopping gracefully");

        feed_task.abort();
        storm_task.abort();
        cluster_task.abort();
        radar_task.abort();
        housekeeping_task.abort();

        info!("sentinel-radar shut down complete");
        Ok(())
    }

    fn clone_for_storm_loop(&self) -> impl std::future::Future<Output = ()> {
        let aggregator = self.aggregator.clone();
        let detector = self.storm.clone();
        let alert_engine = self.alert_engine.clone();
        let config = self.config.clone();
        async move {
            let mut interval = tokio::time::interval(DETECTION_TICK);
            loop {
                interval.tick().await;
                for symbol in aggregator.active_symbols(ACTIVE_SYMBOL_WINDOW_SEC) {
                    if let Some(storm) = detector.detect(&symbol, &aggregator, &config) {
                        alert_engine.notify_storm(&storm).await;
                    }
                }
            }
        }
    }

    fn clone_for_cluster_loop(&self) -> impl std::future::Future<Output = ()> {
        let aggregator = self.aggregator.clone();
        let detector = self.cluster.clone();
        let alert_engine = self.alert_engine.clone();
        let config = self.config.clone();
        async move {
            let mut interval = tokio::time::interval(DETECTION_TICK);
            loop {
                interval.tick().await;
                for symbol in aggregator.active_symbols(ACTIVE_SYMBOL_WINDOW_SEC) {
                    if let Some(cluster) = detector.detect(&symbol, &aggregator, &config) {
                        alert_engine.notify_cluster(&cluster).await;
                    }
                }
            }
        }
    }

    fn clone_for_radar_loop(&self) -> impl std::future::Future<Output = ()> {
        let aggregator = self.aggregator.clone();
        let storm_detector = self.radar_storm.clone();
        let cluster_detector = self.radar_cluster.clone();
        let radar = self.radar.clone();
        let scoring = self.scoring.clone();
        let alert_engine = self.alert_engine.clone();
        let config = self.config.clone();
        async move {
            let mut interval = tokio::time::interval(DETECTION_TICK);
            loop {
                interval.tick().await;
                for symbol in aggregator.active_symbols(ACTIVE_SYMBOL_WINDOW_SEC) {
                    let storm = storm_detector.detect(&symbol, &aggregator, &config);
                    let cluster = cluster_detector.detect(&symbol, &aggregator, &config);
                    if let Some(event) =
                        radar.compose(&symbol, storm.clone(), cluster.clone(), &aggregator, &config)
                    {
                        let now_ms = chrono::Utc::now().timestamp_millis();
                        let thresholds = config.thresholds_for(&symbol);
                        let scored = scoring.score(&symbol, storm.as_ref(), cluster.as_ref(), now_ms, &thresholds);
                        info!(
                            symbol = %symbol,
                            final_score = scored.final_score,
                            confidence = scored.confidence,
                            "enhanced score computed alongside radar event"
                        );
                        let cooldown = radar.cooldown_for(&symbol, &aggregator);
                        alert_engine.notify_radar(&event, cooldown).await;
                    }
                }
            }
        }
    }

    fn clone_for_housekeeping_loop(&self) -> impl std::future::Future<Output = ()> {
        let aggregator = self.aggregator.clone();
        let alert_engine = self.alert_engine.clone();
        async move {
            let mut memory_interval = tokio::time::interval(MEMORY_SWEEP_TICK);
            let mut cooldown_interval = tokio::time::interval(COOLDOWN_SWEEP_TICK);
            loop {
                tokio::select! {
                    _ = memory_interval.tick() => {
                        let usage = aggregator.estimated_memory_mb();
                        aggregator.apply_memory_pressure(usage);
                    }
                    _ = cooldown_interval.tick() => {
                        alert_engine.sweep_cooldowns();
                    }
                }
            }
        }
    }
}
