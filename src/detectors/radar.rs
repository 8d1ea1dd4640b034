// =============================================================================
// Global Radar — composes storm + cluster findings into one composite event.
// =============================================================================

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::aggregator::EventAggregator;
use crate::config::AppConfig;
use crate::types::{
    ClusterInfo, DominantSide, LiqSide, Pressure, RadarEvent, RadarPattern, SignalStrength,
    StormInfo, Volatility,
};

const HIGH_ACTIVITY_TRADE_COUNT: usize = 50;
const HIGH_ACTIVITY_WINDOW_SEC: u64 = 300;
const DEFAULT_COOLDOWN_SEC: u64 = 300;
const HIGH_ACTIVITY_COOLDOWN_SEC: u64 = 150;

pub struct GlobalRadar {
    last_detect: Mutex<HashMap<String, Instant>>,
}

impl GlobalRadar {
    pub fn new() -> Self {
        Self {
            last_detect: Mutex::new(HashMap::new()),
        }
    }

    pub fn compose(
        &self,
        symbol: &str,
        storm: Option<StormInfo>,
        cluster: Option<ClusterInfo>,
        aggregator: &EventAggregator,
        config: &AppConfig,
    ) -> Option<RadarEvent> {
        if storm.is_none() && cluster.is_none() {
            return None;
        }

        let cooldown = self.cooldown_for(symbol, aggregator);
        if let Some(at) = self.last_detect.lock().get(symbol) {
            if at.elapsed().as_secs() < cooldown {
                return None;
            }
        }

        let thresholds = config.thresholds_for(symbol);

        let v_storm = storm
            .as_ref()
            .map(|s| s.total_usd / thresholds.storm_usd)
            .unwrap_or(0.0);
        let v_cluster = cluster
            .as_ref()
            .map(|c| (c.total_buy_usd + c.total_sell_usd) / thresholds.cluster_usd)
            .unwrap_or(0.0);

        let mut score = (v_storm / 3.0).min(0.5) + (v_cluster / 3.0).min(0.5);

        let mut patterns = Vec::new();
        match (&storm, &cluster) {
            (Some(_), Some(_)) => {
                score += thresholds.convergence_bonus;
                patterns.push(RadarPattern::Both);
                if v_storm >= 2.0 && v_cluster >= 2.0 {
                    patterns.push(RadarPattern::Convergence);
                }
            }
            (Some(_), None) => patterns.push(RadarPattern::StormOnly),
            (None, Some(_)) => patterns.push(RadarPattern::ClusterOnly),
            (None, None) => unreachable!(),
        }

        let score = score.clamp(0.0, 1.0);
        let single_pattern = storm.is_none() != cluster.is_none();
        let admitted = score >= thresholds.radar_score_min || (single_pattern && score >= 0.4);
        if !admitted {
            return None;
        }

        let convergence = patterns.contains(&RadarPattern::Convergence);
        let signal_strength = if score >= 0.8 || convergence {
            SignalStrength::Extreme
        } else if score >= 0.6 {
            SignalStrength::Strong
        } else if score >= 0.4 {
            SignalStrength::Moderate
        } else {
            SignalStrength::Weak
        };

        let total_activity_usd = storm.as_ref().map(|s| s.total_usd).unwrap_or(0.0)
            + cluster
                .as_ref()
                .map(|c| c.total_buy_usd + c.total_sell_usd)
                .unwrap_or(0.0);
        let volatility = if total_activity_usd >= 10_000_000.0 {
            Volatility::Extreme
        } else if total_activity_usd >= 5_000_000.0 {
            Volatility::High
        } else if total_activity_usd >= 2_000_000.0 {
            Volatility::Medium
        } else {
            Volatility::Low
        };

        let pressure = classify_pressure(&storm, &cluster);
        let summary = build_summary(symbol, &storm, &cluster, score, signal_strength);

        self.last_detect
            .lock()
            .insert(symbol.to_string(), Instant::now());

        debug!(symbol, score, ?signal_strength, ?pressure, "radar event composed");

        Some(RadarEvent {
            symbol: symbol.to_string(),
            patterns,
            storm,
            cluster,
            composite_score: score,
            volatility,
            pressure,
            signal_strength,
            summary,
            detect_time_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn cooldown_for(&self, symbol: &str, aggregator: &EventAggregator) -> u64 {
        let recent_trades = aggregator.get_trade_window(symbol, Some(HIGH_ACTIVITY_WINDOW_SEC));
        if recent_trades.len() > HIGH_ACTIVITY_TRADE_COUNT {
            HIGH_ACTIVITY_COOLDOWN_SEC
        } else {
            DEFAULT_COOLDOWN_SEC
        }
    }
}

impl Default for GlobalRadar {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_pressure(storm: &Option<StormInfo>, cluster: &Option<ClusterInfo>) -> Pressure {
    let mut bullish = 0.0;
    let mut bearish = 0.0;

    if let Some(s) = storm {
        match s.side {
            LiqSide::ShortLiq => bullish += s.total_usd,
            LiqSide::LongLiq => bearish += s.total_usd,
        }
    }
    if let Some(c) = cluster {
        match c.dominant_side {
            DominantSide::Buy => bullish += c.total_buy_usd * c.dominance_ratio,
            DominantSide::Sell => bearish += c.total_sell_usd * c.dominance_ratio,
        }
    }

    if bullish > 1.5 * bearish && bullish > 0.0 {
        Pressure::Bullish
    } else if bearish > 1.5 * bullish && bearish > 0.0 {
        Pressure::Bearish
    } else {
        Pressure::Neutral
    }
}

fn build_summary(
    symbol: &str,
    storm: &Option<StormInfo>,
    cluster: &Option<ClusterInfo>,
    score: f64,
    strength: SignalStrength,
) -> String {
    let mut parts = Vec::new();
    if let Some(s) = storm {
        parts.push(format!("{} storm ${:.1}M ({})", symbol, s.total_usd / 1e6, s.side));
    }
    if let Some(c) = cluster {
        parts.push(format!(
            "{} cluster ${:.1}M ({})",
            symbol,
            (c.total_buy_usd + c.total_sell_usd) / 1e6,
            c.dominant_side
        ));
    }
    format!(
        "{} -- score {:.2}, strength {:?}",
        parts.join(" + "),
        score,
        strength
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeEvent;

    fn storm(symbol: &str, side: LiqSide, usd: f64) -> StormInfo {
        StormInfo {
            symbol: symbol.to_string(),
            side,
            total_usd: usd,
            count: 5,
            window_seconds: 300,
            detect_time_ms: 0,
        }
    }

    fn cluster(symbol: &str, dominant: DominantSide, buy: f64, sell: f64) -> ClusterInfo {
        let total = buy + sell;
        ClusterInfo {
            symbol: symbol.to_string(),
            total_buy_usd: buy,
            total_sell_usd: sell,
            buy_count: 3,
            sell_count: 1,
            dominant_side: dominant,
            dominance_ratio: buy.max(sell) / total,
            window_seconds: 300,
            detect_time_ms: 0,
        }
    }

    #[test]
    fn convergence_requires_both_ratios_at_least_two() {
        let agg = EventAggregator::new(512);
        let cfg = crate::config::test_config();
        let radar = GlobalRadar::new();
        let found = radar
            .compose(
                "BTCUSDT",
                Some(storm("BTCUSDT", LiqSide::ShortLiq, 5_000_000.0)),
                Some(cluster("BTCUSDT", DominantSide::Buy, 7_000_000.0, 500_000.0)),
                &agg,
                &cfg,
            )
            .expect("should compose radar event");
        assert!(found.patterns.contains(&RadarPattern::Convergence));
        assert_eq!(found.pressure, Pressure::Bullish);
    }

    #[test]
    fn single_pattern_uses_lower_admission_bar() {
        let agg = EventAggregator::new(512);
        let cfg = crate::config::test_config();
        let radar = GlobalRadar::new();
        // v_storm = 2.4M / 2M(majors storm_usd) = 1.2, score = min(1.2/3, 0.5) = 0.4,
        // exactly the single-pattern bar (0.7 full bar would reject this).
        let found = radar.compose(
            "BTCUSDT",
            Some(storm("BTCUSDT", LiqSide::LongLiq, 2_400_000.0)),
            None,
            &agg,
            &cfg,
        );
        let found = found.expect("should clear the single-pattern admission bar");
        assert!((found.composite_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn no_findings_yields_nothing() {
        let agg = EventAggregator::new(512);
        let cfg = crate::config::test_config();
        let radar = GlobalRadar::new();
        assert!(radar.compose("BTCUSDT", None, None, &agg, &cfg).is_none());
    }

    #[test]
    fn high_activity_symbol_gets_halved_cooldown() {
        let agg = EventAggregator::new(512);
        for _ in 0..60 {
            agg.add_trade(TradeEvent {
                symbol: "BTCUSDT".to_string(),
                side: crate::types::TradeSide::Buy,
                price: 1.0,
                volume_usd: 10.0,
                exchange: "x".to_string(),
                event_time_ms: 0,
                ingest_time_ms: 0,
            });
        }
        let radar = GlobalRadar::new();
        assert_eq!(radar.cooldown_for("BTCUSDT", &agg), HIGH_ACTIVITY_COOLDOWN_SEC);
    }
}
