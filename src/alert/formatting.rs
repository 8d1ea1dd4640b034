// Message templates for each alert kind.

use chrono::{TimeZone, Utc};

use crate::types::{ClusterInfo, LiquidationEvent, RadarEvent, StormInfo, TradeEvent};

fn fmt_usd(amount: f64) -> String {
    if amount >= 1_000_000.0 {
        format!("${:.2}M", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("${:.0}K", amount / 1_000.0)
    } else {
        format!("${:.2}", amount)
    }
}

fn fmt_time(event_time_ms: i64) -> String {
    Utc.timestamp_millis_opt(event_time_ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown time".to_string())
}

pub fn format_liquidation_item(event: &LiquidationEvent) -> String {
    format!(
        "Liquidation [{}] {} {} at {} on {} -- {}",
        event.symbol,
        event.side,
        fmt_usd(event.volume_usd),
        event.price,
        event.exchange,
        fmt_time(event.event_time_ms)
    )
}

pub fn format_trade_item(event: &TradeEvent) -> String {
    format!(
        "Whale trade [{}] {} {} at {} on {} -- {}",
        event.symbol,
        event.side,
        fmt_usd(event.volume_usd),
        event.price,
        event.exchange,
        fmt_time(event.event_time_ms)
    )
}

pub fn format_storm(storm: &StormInfo) -> String {
    format!(
        "Liquidation storm [{}] {} side -- {} across {} liquidations in the last {}s",
        storm.symbol,
        storm.side,
        fmt_usd(storm.total_usd),
        storm.count,
        storm.window_seconds
    )
}

pub fn format_cluster(cluster: &ClusterInfo) -> String {
    format!(
        "Whale cluster [{}] {} dominant ({:.0}%) -- buy {} / sell {} in the last {}s",
        cluster.symbol,
        cluster.dominant_side,
        cluster.dominance_ratio * 100.0,
        fmt_usd(cluster.total_buy_usd),
        fmt_usd(cluster.total_sell_usd),
        cluster.window_seconds
    )
}

pub fn format_radar(event: &RadarEvent) -> String {
    let mut lines = vec![format!(
        "Global radar [{}] score {:.2}, {:?}, volatility {:?}, pressure {:?}",
        event.symbol, event.composite_score, event.signal_strength, event.volatility, event.pressure
    )];
    if let Some(storm) = &event.storm {
        lines.push(format_storm(storm));
    }
    if let Some(cluster) = &event.cluster {
        lines.push(format_cluster(cluster));
    }
    lines.push(event.summary.clone());
    lines.join("\n")
}
