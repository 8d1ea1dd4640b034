// =============================================================================
// Event Aggregator -- bounded per-symbol rolling windows of liquidation and
// trade events, with adaptive window sizing and memory-pressure eviction.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::types::{LiquidationEvent, TradeEvent};

const BASE_WINDOW_SEC: u64 = 300;
const MIN_WINDOW_SEC: u64 = 60;
const MAX_WINDOW_SEC: u64 = 1800;
const MAX_EVENTS_PER_BUFFER: usize = 5_000;
const WINDOW_ADJUST_INTERVAL_SEC: u64 = 60;
const BYTES_PER_EVENT_ESTIMATE: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
    Critical,
}

struct SymbolBuffer {
    liquidations: VecDeque<LiquidationEvent>,
    trades: VecDeque<TradeEvent>,
    window_sec: u64,
    last_window_adjust: Instant,
    frequency_ema: f64,
    last_freq_sample: Instant,
    events_since_sample: u64,
}

impl SymbolBuffer {
    fn new(now: Instant) -> Self {
        Self {
            liquidations: VecDeque::new(),
            trades: VecDeque::new(),
            window_sec: BASE_WINDOW_SEC,
            last_window_adjust: now,
            frequency_ema: 0.0,
            last_freq_sample: now,
            events_since_sample: 0,
        }
    }

    fn record_event(&mut self, now: Instant) {
        self.events_since_sample += 1;
        let elapsed = now.duration_since(self.last_freq_sample).as_secs_f64();
        if elapsed >= 5.0 {
            let instantaneous = self.events_since_sample as f64 / elapsed;
            self.frequency_ema = 0.3 * instantaneous + 0.7 * self.frequency_ema;
            self.events_since_sample = 0;
            self.last_freq_sample = now;
        }

        if now.duration_since(self.last_window_adjust).as_secs() >= WINDOW_ADJUST_INTERVAL_SEC {
            self.window_sec = adaptive_window(self.frequency_ema);
            self.last_window_adjust = now;
        }
    }

    fn evict_age(&mut self, now_ms: i64) {
        let cutoff = now_ms - (2 * self.window_sec as i64) * 1000;
        while let Some(front) = self.liquidations.front() {
            if front.ingest_time_ms < cutoff {
                self.liquidations.pop_front();
            } else {
                break;
            }
        }
        while let Some(front) = self.trades.front() {
            if front.ingest_time_ms < cutoff {
                self.trades.pop_front();
            } else {
                break;
            }
        }
        while self.liquidations.len() > MAX_EVENTS_PER_BUFFER {
            self.liquidations.pop_front();
        }
        while self.trades.len() > MAX_EVENTS_PER_BUFFER {
            self.trades.pop_front();
        }
    }

    fn drop_fraction(&mut self, fraction: f64) {
        let liq_drop = (self.liquidations.len() as f64 * fraction) as usize;
        for _ in 0..liq_drop {
            self.liquidations.pop_front();
        }
        let trade_drop = (self.trades.len() as f64 * fraction) as usize;
        for _ in 0..trade_drop {
            self.trades.pop_front();
        }
    }

    fn total_events(&self) -> usize {
        self.liquidations.len() + self.trades.len()
    }
}

fn adaptive_window(frequency_per_sec: f64) -> u64 {
    let w = if frequency_per_sec > 10.0 {
        BASE_WINDOW_SEC / 2
    } else if frequency_per_sec < 0.1 {
        BASE_WINDOW_SEC * 2
    } else {
        BASE_WINDOW_SEC
    };
    w.clamp(MIN_WINDOW_SEC, MAX_WINDOW_SEC)
}

pub fn memory_pressure_for(usage_mb: u64, max_mb: u64) -> MemoryPressure {
    if max_mb == 0 {
        return MemoryPressure::Low;
    }
    let ratio = usage_mb as f64 / max_mb as f64;
    if ratio >= 0.95 {
        MemoryPressure::Critical
    } else if ratio >= 0.80 {
        MemoryPressure::High
    } else if ratio >= 0.60 {
        MemoryPressure::Medium
    } else {
        MemoryPressure::Low
    }
}

/// Thread-safe per-symbol rolling-window store for liquidation and trade
/// events. Guarded by a single reentrant mutex: contention is low and every
/// critical section here is O(window size) at worst.
pub struct EventAggregator {
    buffers: Mutex<HashMap<String, SymbolBuffer>>,
    max_memory_mb: u64,
}

impl EventAggregator {
    pub fn new(max_memory_mb: u64) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            max_memory_mb,
        }
    }

    pub fn add_liquidation(&self, mut event: LiquidationEvent) {
        if event.volume_usd <= 0.0 || event.price <= 0.0 || event.symbol.is_empty() {
            warn!(symbol = %event.symbol, "dropping malformed liquidation event");
            return;
        }
        let now = Instant::now();
        let now_ms = chrono::Utc::now().timestamp_millis();
        if event.ingest_time_ms == 0 {
            event.ingest_time_ms = now_ms;
        }
        let mut map = self.buffers.lock();
        let buf = map
            .entry(event.symbol.clone())
            .or_insert_with(|| SymbolBuffer::new(now));
        buf.liquidations.push_back(event);
        buf.record_event(now);
        buf.evict_age(now_ms);
    }

    pub fn add_trade(&self, mut event: TradeEvent) {
        if event.volume_usd <= 0.0 || event.price <= 0.0 || event.symbol.is_empty() {
            warn!(symbol = %event.symbol, "dropping malformed trade event");
            return;
        }
        let now = Instant::now();
        let now_ms = chrono::Utc::now().timestamp_millis();
        if event.ingest_time_ms == 0 {
            event.ingest_time_ms = now_ms;
        }
        let mut map = self.buffers.lock();
        let buf = map
            .entry(event.symbol.clone())
            .or_insert_with(|| SymbolBuffer::new(now));
        buf.trades.push_back(event);
        buf.record_event(now);
        buf.evict_age(now_ms);
    }

    /// Window size in seconds for this symbol; falls back to the base window
    /// if the symbol has never been observed.
    pub fn window_seconds(&self, symbol: &str) -> u64 {
        self.buffers
            .lock()
            .get(symbol)
            .map(|b| b.window_sec)
            .unwrap_or(BASE_WINDOW_SEC)
    }

    pub fn get_liquidation_window(&self, symbol: &str, window_sec: Option<u64>) -> Vec<LiquidationEvent> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let map = self.buffers.lock();
        let Some(buf) = map.get(symbol) else {
            return Vec::new();
        };
        let w = window_sec.unwrap_or(buf.window_sec);
        let cutoff = now_ms - (w as i64) * 1000;
        buf.liquidations
            .iter()
            .filter(|e| e.ingest_time_ms >= cutoff)
            .cloned()
            .collect()
    }

    pub fn get_trade_window(&self, symbol: &str, window_sec: Option<u64>) -> Vec<TradeEvent> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let map = self.buffers.lock();
        let Some(buf) = map.get(symbol) else {
            return Vec::new();
        };
        let w = window_sec.unwrap_or(buf.window_sec);
        let cutoff = now_ms - (w as i64) * 1000;
        buf.trades
            .iter()
            .filter(|e| e.ingest_time_ms >= cutoff)
            .cloned()
            .collect()
    }

    /// Symbols with at least one event (of either kind) newer than `since_sec`.
    pub fn active_symbols(&self, since_sec: u64) -> Vec<String> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let cutoff = now_ms - (since_sec as i64) * 1000;
        let map = self.buffers.lock();
        map.iter()
            .filter(|(_, buf)| {
                buf.liquidations
                    .back()
                    .map(|e| e.ingest_time_ms >= cutoff)
                    .unwrap_or(false)
                    || buf
                        .trades
                        .back()
                        .map(|e| e.ingest_time_ms >= cutoff)
                        .unwrap_or(false)
            })
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Global sweep: remove events older than `age_sec` from every buffer and
    /// drop any symbol left with no events.
    pub fn clear_older_than(&self, age_sec: u64) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let cutoff = now_ms - (age_sec as i64) * 1000;
        let mut map = self.buffers.lock();
        map.retain(|_, buf| {
            buf.liquidations.retain(|e| e.ingest_time_ms >= cutoff);
            buf.trades.retain(|e| e.ingest_time_ms >= cutoff);
            buf.total_events() > 0
        });
    }

    /// Sample current memory pressure (given externally measured usage) and
    /// react by evicting a fraction of every buffer if pressure is high.
    pub fn apply_memory_pressure(&self, usage_mb: u64) -> MemoryPressure {
        let pressure = memory_pressure_for(usage_mb, self.max_memory_mb);
        if matches!(pressure, MemoryPressure::High | MemoryPressure::Critical) {
            let fraction = if pressure == MemoryPressure::Critical {
                0.8
            } else {
                0.6
            };
            let mut map = self.buffers.lock();
            for buf in map.values_mut() {
                buf.drop_fraction(fraction);
            }
            debug!(?pressure, fraction, "aggregator memory pressure eviction");
        }
        pressure
    }

    /// Rough resident-size estimate in MB, used by the runner to feed
    /// `apply_memory_pressure`.
    pub fn estimated_memory_mb(&self) -> u64 {
        let map = self.buffers.lock();
        let total_events: u64 = map.values().map(|b| b.total_events() as u64).sum();
        (total_events * BYTES_PER_EVENT_ESTIMATE) / (1024 * 1024)
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new(512)
    }
}

#[allow(dead_code)]
fn duration_since_ms(since: Instant) -> i64 {
    Duration::from(since.elapsed()).as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LiqSide, TradeSide};

    fn liq(symbol: &str, side: LiqSide, usd: f64) -> LiquidationEvent {
        LiquidationEvent {
            symbol: symbol.to_string(),
            side,
            price: 100.0,
            volume_usd: usd,
            exchange: "binance".to_string(),
            event_time_ms: 0,
            ingest_time_ms: 0,
        }
    }

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
    fn round_trip_includes_event_exactly_once() {
        let agg = EventAggregator::new(512);
        agg.add_liquidation(liq("BTCUSDT", LiqSide::LongLiq, 1_000.0));
        let window = agg.get_liquidation_window("BTCUSDT", Some(3600));
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].symbol, "BTCUSDT");
    }

    #[test]
    fn window_filters_by_symbol() {
        let agg = EventAggregator::new(512);
        agg.add_trade(trade("BTCUSDT", TradeSide::Buy, 500.0));
        agg.add_trade(trade("ETHUSDT", TradeSide::Sell, 500.0));
        let window = agg.get_trade_window("BTCUSDT", Some(3600));
        assert_eq!(window.len(), 1);
        assert!(window.iter().all(|e| e.symbol == "BTCUSDT"));
    }

    #[test]
    fn malformed_event_is_dropped_silently() {
        let agg = EventAggregator::new(512);
        agg.add_liquidation(liq("BTCUSDT", LiqSide::LongLiq, 0.0));
        assert!(agg.get_liquidation_window("BTCUSDT", Some(3600)).is_empty());
    }

    #[test]
    fn clear_older_than_removes_stale_and_empties_symbol() {
        let agg = EventAggregator::new(512);
        agg.add_liquidation(liq("BTCUSDT", LiqSide::ShortLiq, 1_000.0));
        agg.clear_older_than(0);
        assert!(agg.get_liquidation_window("BTCUSDT", Some(3600)).is_empty());
        assert!(agg.active_symbols(3600).is_empty());
    }

    #[test]
    fn memory_pressure_thresholds() {
        assert_eq!(memory_pressure_for(100, 512), MemoryPressure::Low);
        assert_eq!(memory_pressure_for(310, 512), MemoryPressure::Medium);
        assert_eq!(memory_pressure_for(410, 512), MemoryPressure::High);
        assert_eq!(memory_pressure_for(490, 512), MemoryPressure::Critical);
    }

    #[test]
    fn critical_pressure_evicts_at_least_half_of_events() {
        let agg = EventAggregator::new(512);
        for i in 0..20 {
            agg.add_liquidation(liq("BTCUSDT", LiqSide::LongLiq, 1_000.0 + i as f64));
        }
        let before = agg.get_liquidation_window("BTCUSDT", Some(3600)).len();
        agg.apply_memory_pressure(500);
        let after = agg.get_liquidation_window("BTCUSDT", Some(3600)).len();
        assert!(after <= before / 2 + 1);
    }
}
