// =============================================================================
// Storm Detector — side-homogeneous liquidation bursts.
// =============================================================================

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::aggregator::EventAggregator;
use crate::config::AppConfig;
use crate::types::{LiqSide, StormInfo};

pub struct StormDetector {
    last_detect: Mutex<HashMap<String, Instant>>,
}

impl StormDetector {
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
    ) -> Option<StormInfo> {
        let thresholds = config.thresholds_for(symbol);

        {
            let mut last = self.last_detect.lock();
            if let Some(at) = last.get(symbol) {
                if at.elapsed().as_secs() < thresholds.storm_cooldown_sec {
                    return None;
                }
            }
            // Reserve the slot optimistically removed below if no finding occurs.
            last.remove(symbol);
        }

        let window_sec = aggregator.window_seconds(symbol);
        let events = aggregator.get_liquidation_window(symbol, Some(window_sec));

        let (mut long_usd, mut long_count) = (0.0, 0usize);
        let (mut short_usd, mut short_count) = (0.0, 0usize);
        for e in &events {
            match e.side {
                LiqSide::LongLiq => {
                    long_usd += e.volume_usd;
                    long_count += 1;
                }
                LiqSide::ShortLiq => {
                    short_usd += e.volume_usd;
                    short_count += 1;
                }
            }
        }

        let long_qualifies =
            long_usd >= thresholds.storm_usd && long_count >= thresholds.storm_count;
        let short_qualifies =
            short_usd >= thresholds.storm_usd && short_count >= thresholds.storm_count;

        let finding = match (long_qualifies, short_qualifies) {
            (false, false) => None,
            (true, false) => Some((LiqSide::LongLiq, long_usd, long_count)),
            (false, true) => Some((LiqSide::ShortLiq, short_usd, short_count)),
            (true, true) => {
                if long_usd >= short_usd {
                    Some((LiqSide::LongLiq, long_usd, long_count))
                } else {
                    Some((LiqSide::ShortLiq, short_usd, short_count))
                }
            }
        };

        let (side, total_usd, count) = finding?;

        self.last_detect
            .lock()
            .insert(symbol.to_string(), Instant::now());

        debug!(symbol, %side, total_usd, count, "liquidation storm detected");

        Some(StormInfo {
            symbol: symbol.to_string(),
            side,
            total_usd,
            count,
            window_seconds: window_sec,
            detect_time_ms: chrono::Utc::now().timestamp_millis(),
        })
    }
}

impl Default for StormDetector {
    fn default() -> Self {
        Self::new()
    }
}
