// =============================================================================
// Alert Engine — cooldown gate, threshold gate, formatting, and fan-out.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::alert::cooldown::CooldownTable;
use crate::alert::formatting;
use crate::alert::sink::ChatSink;
use crate::auth::RateLimitTracker;
use crate::config::AppConfig;
use crate::types::{AlertKind, ClusterInfo, LiquidationEvent, RadarEvent, StormInfo, TradeEvent};

const INTER_DESTINATION_SPACING: Duration = Duration::from_millis(100);

pub struct AlertEngine {
    config: Arc<AppConfig>,
    cooldowns: CooldownTable,
    sinks: Vec<Arc<dyn ChatSink>>,
    rate_limiter: RateLimitTracker,
}

impl AlertEngine {
    pub fn new(config: Arc<AppConfig>, sinks: Vec<Arc<dyn ChatSink>>) -> Self {
        Self {
            config,
            cooldowns: CooldownTable::new(),
            sinks,
            rate_limiter: RateLimitTracker::default(),
        }
    }

    pub async fn send_startup_message(&self, text: &str) {
        self.dispatch_raw(text).await;
    }

    pub async fn notify_liquidation(&self, event: &LiquidationEvent) {
        let thresholds = self.config.thresholds_for(&event.symbol);
        if event.volume_usd < thresholds.liq_min_usd {
            return;
        }
        let kind = match event.side {
            crate::types::LiqSide::LongLiq => AlertKind::LiqLong,
            crate::types::LiqSide::ShortLiq => AlertKind::LiqShort,
        };
        self.dispatch(kind, &event.symbol, thresholds.storm_cooldown_sec, || {
            formatting::format_liquidation_item(event)
        })
        .await;
    }

    pub async fn notify_trade(&self, event: &TradeEvent) {
        let thresholds = self.config.thresholds_for(&event.symbol);
        if event.volume_usd < thresholds.whale_min_usd {
            return;
        }
        let kind = match event.side {
            crate::types::TradeSide::Buy => AlertKind::WhaleBuy,
            crate::types::TradeSide::Sell => AlertKind::WhaleSell,
        };
        self.dispatch(kind, &event.symbol, thresholds.storm_cooldown_sec, || {
            formatting::format_trade_item(event)
        })
        .await;
    }

    pub async fn notify_storm(&self, storm: &StormInfo) {
        let thresholds = self.config.thresholds_for(&storm.symbol);
        self.dispatch(
            AlertKind::LiqStorm,
            &storm.symbol,
            thresholds.storm_cooldown_sec,
            || formatting::format_storm(storm),
        )
        .await;
    }

    pub async fn notify_cluster(&self, cluster: &ClusterInfo) {
        let thresholds = self.config.thresholds_for(&cluster.symbol);
        self.dispatch(
            AlertKind::WhaleCluster,
            &cluster.symbol,
            thresholds.cluster_cooldown_sec,
            || formatting::format_cluster(cluster),
        )
        .await;
    }

    /// `cooldown_sec` is the detector's own admission cooldown (300s, or
    /// 150s for high-activity symbols) so the Alert Engine's gate matches
    /// the Global Radar's, instead of reusing a fixed base cooldown.
    pub async fn notify_radar(&self, event: &RadarEvent, cooldown_sec: u64) {
        self.dispatch(AlertKind::GlobalRadar, &event.symbol, cooldown_sec, || {
            formatting::format_radar(event)
        })
        .await;
    }

    /// Periodic background sweep of stale cooldown entries.
    pub fn sweep_cooldowns(&self) {
        self.cooldowns.sweep(chrono::Utc::now().timestamp_millis());
    }

    async fn dispatch(&self, kind: AlertKind, symbol: &str, cooldown_sec: u64, render: impl FnOnce() -> String) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if !self.cooldowns.try_acquire(kind, symbol, now_ms, cooldown_sec) {
            return;
        }
        self.dispatch_raw(&render()).await;
    }

    async fn dispatch_raw(&self, text: &str) {
        for chat_id in &self.config.chat_sink_chat_ids {
            if !self.rate_limiter.try_acquire() {
                error!(chat_id = %chat_id, "outbound rate limit exceeded, dropping alert for this destination");
                continue;
            }
            for sink in &self.sinks {
                if let Err(e) = sink.send(chat_id, text).await {
                    error!(chat_id = %chat_id, error = %e, "failed to dispatch alert to sink");
                }
            }
            tokio::time::sleep(INTER_DESTINATION_SPACING).await;
        }
        info!(text_len = text.len(), "alert dispatched");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DominantSide, LiqSide};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        sent: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatSink for CountingSink {
        async fn send(&self, _chat_id: &str, _text: &str) -> anyhow::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn engine_with_sink() -> (Arc<AlertEngine>, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink { sent: AtomicUsize::new(0) });
        let cfg = Arc::new(crate::config::test_config());
        let engine = Arc::new(AlertEngine::new(cfg, vec![sink.clone() as Arc<dyn ChatSink>]));
        (engine, sink)
    }

    #[tokio::test]
    async fn storm_alert_is_dispatched_once_per_cooldown() {
        let (engine, sink) = engine_with_sink();
        let storm = StormInfo {
            symbol: "BTCUSDT".to_string(),
            side: LiqSide::ShortLiq,
            total_usd: 3_000_000.0,
            count: 5,
            window_seconds: 300,
            detect_time_ms: 0,
        };
        engine.notify_storm(&storm).await;
        engine.notify_storm(&storm).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), engine.config.chat_sink_chat_ids.len());
    }

    #[tokio::test]
    async fn liquidation_below_threshold_is_not_dispatched() {
        let (engine, sink) = engine_with_sink();
        let event = LiquidationEvent {
            symbol: "BTCUSDT".to_string(),
            side: LiqSide::LongLiq,
            price: 1.0,
            volume_usd: 1.0,
            exchange: "x".to_string(),
            event_time_ms: 0,
            ingest_time_ms: 0,
        };
        engine.notify_liquidation(&event).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn radar_event_is_dispatched_to_every_destination() {
        let (engine, sink) = engine_with_sink();
        let event = RadarEvent {
            symbol: "BTCUSDT".to_string(),
            patterns: vec![],
            storm: None,
            cluster: Some(ClusterInfo {
                symbol: "BTCUSDT".to_string(),
                total_buy_usd: 4_000_000.0,
                total_sell_usd: 500_000.0,
                buy_count: 4,
                sell_count: 1,
                dominant_side: DominantSide::Buy,
                dominance_ratio: 0.88,
                window_seconds: 300,
                detect_time_ms: 0,
            }),
            composite_score: 0.6,
            volatility: crate::types::Volatility::Medium,
            pressure: crate::types::Pressure::Bullish,
            signal_strength: crate::types::SignalStrength::Moderate,
            summary: "test summary".to_string(),
            detect_time_ms: 0,
        };
        engine.notify_radar(&event, 300).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), engine.config.chat_sink_chat_ids.len());
    }
}
