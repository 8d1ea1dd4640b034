// =============================================================================
// Cluster Detector — side-dominated whale trade clusters.
// =============================================================================

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::aggregator::EventAggregator;
use crate::config::AppConfig;
use crate::types::{ClusterInfo, DominantSide, TradeSide};

pub struct ClusterDetector {
    last_detect: Mutex<HashMap<String, Instant>>,
}

impl ClusterDetector {
    pub fn new() -> Self {
        Self {
            last_detect: Mutex::new(HashMap::new()),
        }
    }

    pub fn detect(
        &self,
        symbol: &str,
        aggregator: &EventAggregator,
        config: &AppConfig,
    ) -> Option<ClusterInfo> {
        let thresholds = config.thresholds_for(symbol);

        if let Some(at) = self.last_detect.lock().get(symbol) {
            if at.elapsed().as_secs() < thresholds.cluster_cooldown_sec {
                return None;
            }
        }

        let window_sec = aggregator.window_seconds(symbol);
        let events = aggregator.get_trade_window(symbol, Some(window_sec));

        let (mut buy_usd, mut buy_count) = (0.0, 0usize);
        let (mut sell_usd, mut sell_count) = (0.0, 0usize);
        for e in &events {
            match e.side {
                TradeSide::Buy => {
                    buy_usd += e.volume_usd;
                    buy_count += 1;
                }
                TradeSide::Sell => {
                    sell_usd += e.volume_usd;
                    sell_count += 1;
                }
            }
        }

        let total_usd = buy_usd + sell_usd;
        let total_count = buy_count + sell_count;
        if total_usd < thresholds.cluster_usd || total_count < thresholds.cluster_count {
            return None;
        }

        let dominance = buy_usd.max(sell_usd) / total_usd;
        if dominance < thresholds.cluster_dominance_min {
            return None;
        }

        let dominant_side = if buy_usd >= sell_usd {
            DominantSide::Buy
        } else {
            DominantSide::Sell
        };

        self.last_detect
            .lock()
            .insert(symbol.to_string(), Instant::now());

        debug!(symbol, %dominant_side, dominance, "whale cluster detected");

        Some(ClusterInfo {
            symbol: symbol.to_string(),
            total_buy_usd: buy_usd,
            total_sell_usd: sell_usd,
            buy_count,
            sell_count,
            dominant_side,
            dominance_ratio: dominance,
            window_seconds: window_sec,
            detect_time_ms: chrono::Utc::now().timestamp_millis(),
        })
    }
}

impl Default for ClusterDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeEvent;

    fn trade(symbol: &str, side: TradeSide, usd: f64) -> TradeEvent {
        TradeEvent {
            symbol: symbol.to_string(),
            side,
            price: 100.0,
            volume_usd: usd,
            exchange: "binance".to_string(),
            event_time_ms: 0,
            ingest_time_ms: 0,
        }
    }

    #[test]
    fn dominant_cluster_is_detected() {
        let agg = EventAggregator::new(512);
        let cfg = crate::config::test_config();
        for _ in 0..4 {
            agg.add_trade(trade("BTCUSDT", TradeSide::Buy, 1_000_000.0));
        }
        agg.add_trade(trade("BTCUSDT", TradeSide::Sell, 100_000.0));

        let detector = ClusterDetector::new();
        let found = detector
            .detect("BTCUSDT", &agg, &cfg)
            .expect("should detect cluster");
        assert_eq!(found.dominant_side, DominantSide::Buy);
        assert!(found.dominance_ratio >= 0.70);
    }

    #[test]
    fn balanced_flow_is_discarded() {
        let agg = EventAggregator::new(512);
        let cfg = crate::config::test_config();
        for _ in 0..4 {
            agg.add_trade(trade("BTCUSDT", TradeSide::Buy, 1_000_000.0));
            agg.add_trade(trade("BTCUSDT", TradeSide::Sell, 1_000_000.0));
        }
        let detector = ClusterDetector::new();
        assert!(detector.detect("BTCUSDT", &agg, &cfg).is_none());
    }

    #[test]
    fn dominance_exactly_at_threshold_is_inclusive() {
        let agg = EventAggregator::new(512);
        let cfg = crate::config::test_config();
        // MAJORS: usd>=3M, count>=3. buy=1.5M+0.6M=2.1M, sell=0.9M,
        // total=3.0M -> dominance = 2.1M/3.0M = 0.70 exactly.
        agg.add_trade(trade("BTCUSDT", TradeSide::Buy, 1_500_000.0));
        agg.add_trade(trade("BTCUSDT", TradeSide::Buy, 600_000.0));
        agg.add_trade(trade("BTCUSDT", TradeSide::Sell, 900_000.0));
        let detector = ClusterDetector::new();
        let found = detector.detect("BTCUSDT", &agg, &cfg).expect("should detect cluster at boundary");
        assert!((found.dominance_ratio - 0.70).abs() < 1e-9);
    }
}
