// =============================================================================
// Enhanced Scoring Engine — weighted, time-decayed, context-adjusted composite
// score combining storm and cluster detector findings.
// =============================================================================

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::GroupThresholds;
use crate::types::{ClusterInfo, DominantSide, LiqSide, StormInfo};

const WEIGHT_STORM: f64 = 0.4;
const WEIGHT_CLUSTER: f64 = 0.4;
const WEIGHT_CONVERGENCE: f64 = 0.6;
const DECAY_LAMBDA_PER_MIN: f64 = 0.1;
const MARKET_CONTEXT_TTL: Duration = Duration::from_secs(60);
const HISTORY_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketRegimeTag {
    BullMomentum,
    BearMomentum,
    Volatile,
    Neutral,
}

#[derive(Debug, Clone, Copy)]
pub struct MarketContext {
    pub regime: MarketRegimeTag,
    pub volatility_index: f64,
    pub symbol_volume_share: f64,
    pub session_hour_utc: u8,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            regime: MarketRegimeTag::Neutral,
            volatility_index: 0.0,
            symbol_volume_share: 0.0,
            session_hour_utc: 12,
        }
    }
}

impl MarketContext {
    fn multiplier(&self) -> f64 {
        let regime_mult = match self.regime {
            MarketRegimeTag::BullMomentum => 1.2,
            MarketRegimeTag::BearMomentum => 1.3,
            MarketRegimeTag::Volatile => 1.1,
            MarketRegimeTag::Neutral => 1.0,
        };
        let vol_mult = 1.0 + 0.3 * self.volatility_index;
        let volume_mult = if self.symbol_volume_share > 0.3 { 1.5 } else { 1.0 };
        let hour_mult = if (20..=23).contains(&self.session_hour_utc) {
            1.1
        } else if (2..=6).contains(&self.session_hour_utc) {
            0.9
        } else {
            1.0
        };
        regime_mult * vol_mult * volume_mult * hour_mult
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    LiquidationStorm,
    WhaleCluster,
    Convergence,
    Reversal,
    Momentum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub storm_contribution: f64,
    pub cluster_contribution: f64,
    pub weighted_base: f64,
    pub time_decay_multiplier: f64,
    pub market_context_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedScore {
    pub symbol: String,
    pub final_score: f64,
    pub confidence: f64,
    pub signal_types: Vec<SignalType>,
    pub breakdown: ScoreBreakdown,
}

struct HistorySample {
    at: Instant,
    volume: f64,
}

/// Per-symbol bounded history of recent volume samples, used to estimate
/// volatility/volume anomaly for the market-context cache.
struct HistoricalContext {
    samples: VecDeque<HistorySample>,
}

impl HistoricalContext {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    fn record(&mut self, volume: f64, now: Instant) {
        self.samples.push_back(HistorySample { at: now, volume });
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > HISTORY_RETENTION {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct ScoringEngine {
    history: RwLock<std::collections::HashMap<String, HistoricalContext>>,
    market_context: RwLock<(MarketContext, Instant)>,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(std::collections::HashMap::new()),
            market_context: RwLock::new((MarketContext::default(), Instant::now())),
        }
    }

    /// Update the cached market context if its TTL has expired, or force an
    /// update regardless.
    pub fn set_market_context(&self, ctx: MarketContext) {
        *self.market_context.write() = (ctx, Instant::now());
    }

    fn current_market_context(&self) -> MarketContext {
        let guard = self.market_context.read();
        if guard.1.elapsed() > MARKET_CONTEXT_TTL {
            MarketContext::default()
        } else {
            guard.0
        }
    }

    pub fn score(
        &self,
        symbol: &str,
        storm: Option<&StormInfo>,
        cluster: Option<&ClusterInfo>,
        now_ms: i64,
        thresholds: &GroupThresholds,
    ) -> EnhancedScore {
        let storm_contrib = storm.map(|s| storm_contribution(s, thresholds)).unwrap_or(0.0);
        let cluster_contrib = cluster.map(|c| cluster_contribution(c, thresholds)).unwrap_or(0.0);

        let convergence_bonus = if storm.is_some() && cluster.is_some() {
            WEIGHT_CONVERGENCE * 0.1
        } else {
            0.0
        };

        let base = (WEIGHT_STORM * storm_contrib + WEIGHT_CLUSTER * cluster_contrib
            + convergence_bonus)
            .clamp(0.0, 1.0);

        let oldest_ms = [
            storm.map(|s| s.detect_time_ms),
            cluster.map(|c| c.detect_time_ms),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(now_ms);

        let delta_min = ((now_ms - oldest_ms).max(0) as f64) / 60_000.0;
        let mut time_decay = (-DECAY_LAMBDA_PER_MIN * delta_min).exp();
        if delta_min < 5.0 {
            time_decay += 0.3 * (1.0 - delta_min / 5.0);
        }
        let base_decayed = base * time_decay;

        let ctx = self.current_market_context();
        let ctx_mult = ctx.multiplier();
        let base_contextual = (base_decayed * ctx_mult).clamp(0.0, 1.0);

        let confidence = self.confidence(storm, cluster, base, time_decay, ctx_mult);
        let final_score = base_contextual * (0.5 + 0.5 * confidence);

        let mut signal_types = Vec::new();
        if storm.is_some() {
            signal_types.push(SignalType::LiquidationStorm);
        }
        if cluster.is_some() {
            signal_types.push(SignalType::WhaleCluster);
        }
        if storm.is_some() && cluster.is_some() {
            signal_types.push(SignalType::Convergence);
        }
        if storm.map(|s| s.total_usd >= 2_000_000.0).unwrap_or(false) {
            signal_types.push(SignalType::Reversal);
        }
        if cluster.map(|c| c.dominance_ratio >= 0.7).unwrap_or(false) {
            signal_types.push(SignalType::Momentum);
        }

        let volume_for_history = storm.map(|s| s.total_usd).unwrap_or(0.0)
            + cluster
                .map(|c| c.total_buy_usd + c.total_sell_usd)
                .unwrap_or(0.0);
        if volume_for_history > 0.0 {
            let mut history = self.history.write();
            history
                .entry(symbol.to_string())
                .or_insert_with(HistoricalContext::new)
                .record(volume_for_history, Instant::now());
        }

        EnhancedScore {
            symbol: symbol.to_string(),
            final_score,
            confidence,
            signal_types,
            breakdown: ScoreBreakdown {
                storm_contribution: storm_contrib,
                cluster_contribution: cluster_contrib,
                weighted_base: base,
                time_decay_multiplier: time_decay,
                market_context_multiplier: ctx_mult,
            },
        }
    }

    fn confidence(
        &self,
        storm: Option<&StormInfo>,
        cluster: Option<&ClusterInfo>,
        base_score: f64,
        time_decay: f64,
        ctx_mult: f64,
    ) -> f64 {
        let consistency = match (storm.is_some(), cluster.is_some()) {
            (true, true) => 0.8,
            (true, false) | (false, true) => 0.6,
            (false, false) => 0.3,
        };

        let stability = if (base_score - 0.5).abs() > 0.2 { 0.7 } else { 0.5 };

        let recency = if time_decay >= 0.8 {
            0.8
        } else if time_decay >= 0.5 {
            0.6
        } else {
            0.4
        };

        let alignment = if ctx_mult >= 0.7 {
            0.7
        } else if ctx_mult >= 0.4 {
            0.5
        } else {
            0.3
        };

        (consistency + stability + recency + alignment) / 4.0
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn storm_contribution(storm: &StormInfo, thresholds: &GroupThresholds) -> f64 {
    let v_storm = storm.total_usd / thresholds.storm_usd;
    let side_weight = if storm.side == LiqSide::ShortLiq { 1.2 } else { 1.0 };
    let count_bonus = (storm.count as f64 / 10.0).min(1.0) * 0.2;
    ((v_storm + 1.0).log10() / 3.0) * side_weight + count_bonus
}

fn cluster_contribution(cluster: &ClusterInfo, thresholds: &GroupThresholds) -> f64 {
    let total = cluster.total_buy_usd + cluster.total_sell_usd;
    let v_cluster = total / thresholds.cluster_usd;
    let total_count = (cluster.buy_count + cluster.sell_count).max(1);
    let balance = cluster.buy_count.min(cluster.sell_count) as f64 / total_count as f64;
    ((v_cluster + 1.0).log10() / 3.0) + cluster.dominance_ratio * 0.2 + balance * 0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storm(usd: f64, side: LiqSide, detect_time_ms: i64) -> StormInfo {
        StormInfo {
            symbol: "BTCUSDT".to_string(),
            side,
            total_usd: usd,
            count: 5,
            window_seconds: 300,
            detect_time_ms,
        }
    }

    fn cluster(buy: f64, sell: f64, detect_time_ms: i64) -> ClusterInfo {
        let total = buy + sell;
        ClusterInfo {
            symbol: "BTCUSDT".to_string(),
            total_buy_usd: buy,
            total_sell_usd: sell,
            buy_count: 3,
            sell_count: 1,
            dominant_side: if buy >= sell { DominantSide::Buy } else { DominantSide::Sell },
            dominance_ratio: buy.max(sell) / total,
            window_seconds: 300,
            detect_time_ms,
        }
    }

    fn thresholds() -> GroupThresholds {
        crate::config::test_config().thresholds_for("BTCUSDT")
    }

    #[test]
    fn score_is_bounded_in_unit_interval() {
        let engine = ScoringEngine::new();
        let now = 1_700_000_000_000;
        let result = engine.score(
            "BTCUSDT",
            Some(&storm(5_000_000.0, LiqSide::ShortLiq, now)),
            Some(&cluster(4_000_000.0, 500_000.0, now)),
            now,
            &thresholds(),
        );
        assert!(result.final_score >= 0.0 && result.final_score <= 1.0);
        assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn convergence_tag_requires_both_findings() {
        let engine = ScoringEngine::new();
        let now = 1_700_000_000_000;
        let result = engine.score(
            "BTCUSDT",
            Some(&storm(3_000_000.0, LiqSide::LongLiq, now)),
            Some(&cluster(2_000_000.0, 200_000.0, now)),
            now,
            &thresholds(),
        );
        assert!(result.signal_types.contains(&SignalType::Convergence));
    }

    #[test]
    fn older_findings_decay_towards_lower_score() {
        let engine = ScoringEngine::new();
        let now = 1_700_000_000_000;
        let fresh = engine.score(
            "BTCUSDT",
            Some(&storm(3_000_000.0, LiqSide::ShortLiq, now)),
            None,
            now,
            &thresholds(),
        );
        let stale = engine.score(
            "BTCUSDT",
            Some(&storm(3_000_000.0, LiqSide::ShortLiq, now - 30 * 60_000)),
            None,
            now,
            &thresholds(),
        );
        assert!(stale.final_score < fresh.final_score);
    }

    #[test]
    fn bull_regime_boosts_score_over_neutral() {
        let engine = ScoringEngine::new();
        let now = 1_700_000_000_000;
        let neutral = engine.score(
            "BTCUSDT",
            Some(&storm(3_000_000.0, LiqSide::ShortLiq, now)),
            None,
            now,
            &thresholds(),
        );
        engine.set_market_context(MarketContext {
            regime: MarketRegimeTag::BullMomentum,
            ..MarketContext::default()
        });
        let boosted = engine.score(
            "BTCUSDT",
            Some(&storm(3_000_000.0, LiqSide::ShortLiq, now)),
            None,
            now,
            &thresholds(),
        );
        assert!(boosted.final_score > neutral.final_score);
    }
}
