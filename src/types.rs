use std::fmt;

use serde::{Deserialize, Serialize};

/// Static classification of a symbol, controlling thresholds and cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolGroup {
    Majors,
    LargeCap,
    MidCap,
}

impl Default for SymbolGroup {
    fn default() -> Self {
        SymbolGroup::MidCap
    }
}

impl fmt::Display for SymbolGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolGroup::Majors => write!(f, "MAJORS"),
            SymbolGroup::LargeCap => write!(f, "LARGE_CAP"),
            SymbolGroup::MidCap => write!(f, "MID_CAP"),
        }
    }
}

/// Liquidation side. Upstream encodes 1 = long liquidation (buy-side fill),
/// 2 = short liquidation (sell-side fill). Kept distinct from `TradeSide`
/// because the raw integer encoding does not mean the same thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiqSide {
    LongLiq,
    ShortLiq,
}

impl fmt::Display for LiqSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiqSide::LongLiq => write!(f, "long_liq"),
            LiqSide::ShortLiq => write!(f, "short_liq"),
        }
    }
}

impl LiqSide {
    /// Upstream raw side: 1 -> long liq, 2 -> short liq.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(LiqSide::LongLiq),
            2 => Some(LiqSide::ShortLiq),
            _ => None,
        }
    }
}

/// Trade side. Upstream encodes 1 = SELL, 2 = BUY — intentionally the
/// opposite convention from `LiqSide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Sell,
    Buy,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Sell => write!(f, "SELL"),
            TradeSide::Buy => write!(f, "BUY"),
        }
    }
}

impl TradeSide {
    /// Upstream raw side: 1 -> SELL, 2 -> BUY.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(TradeSide::Sell),
            2 => Some(TradeSide::Buy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub symbol: String,
    pub side: LiqSide,
    pub price: f64,
    pub volume_usd: f64,
    pub exchange: String,
    pub event_time_ms: i64,
    pub ingest_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    pub side: TradeSide,
    pub price: f64,
    pub volume_usd: f64,
    pub exchange: String,
    pub event_time_ms: i64,
    pub ingest_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StormInfo {
    pub symbol: String,
    pub side: LiqSide,
    pub total_usd: f64,
    pub count: usize,
    pub window_seconds: u64,
    pub detect_time_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DominantSide {
    Buy,
    Sell,
}

impl fmt::Display for DominantSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DominantSide::Buy => write!(f, "BUY"),
            DominantSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub symbol: String,
    pub total_buy_usd: f64,
    pub total_sell_usd: f64,
    pub buy_count: usize,
    pub sell_count: usize,
    pub dominant_side: DominantSide,
    pub dominance_ratio: f64,
    pub window_seconds: u64,
    pub detect_time_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Volatility {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pressure {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadarPattern {
    StormOnly,
    ClusterOnly,
    Both,
    Convergence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarEvent {
    pub symbol: String,
    pub patterns: Vec<RadarPattern>,
    pub storm: Option<StormInfo>,
    pub cluster: Option<ClusterInfo>,
    pub composite_score: f64,
    pub volatility: Volatility,
    pub pressure: Pressure,
    pub signal_strength: SignalStrength,
    pub summary: String,
    pub detect_time_ms: i64,
}

/// Tag distinguishing every alert-eligible event for cooldown/threshold lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    LiqLong,
    LiqShort,
    WhaleBuy,
    WhaleSell,
    LiqStorm,
    WhaleCluster,
    GlobalRadar,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::LiqLong => "LIQ_LONG",
            AlertKind::LiqShort => "LIQ_SHORT",
            AlertKind::WhaleBuy => "WHALE_BUY",
            AlertKind::WhaleSell => "WHALE_SELL",
            AlertKind::LiqStorm => "LIQ_STORM",
            AlertKind::WhaleCluster => "WHALE_CLUSTER",
            AlertKind::GlobalRadar => "GLOBAL_RADAR",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liq_side_raw_mapping() {
        assert_eq!(LiqSide::from_raw(1), Some(LiqSide::LongLiq));
        assert_eq!(LiqSide::from_raw(2), Some(LiqSide::ShortLiq));
        assert_eq!(LiqSide::from_raw(3), None);
    }

    #[test]
    fn trade_side_raw_mapping_is_opposite_convention() {
        assert_eq!(TradeSide::from_raw(1), Some(TradeSide::Sell));
        assert_eq!(TradeSide::from_raw(2), Some(TradeSide::Buy));
    }

    #[test]
    fn symbol_group_default_is_mid_cap() {
        assert_eq!(SymbolGroup::default(), SymbolGroup::MidCap);
    }
}
