// =============================================================================
// Cooldown table -- per (alert kind, symbol) suppression of repeated alerts.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::AlertKind;

const STALE_ENTRY_MAX_AGE_MS: i64 = 24 * 3600 * 1000;

struct Inner {
    last_dispatch_ms: HashMap<(AlertKind, String), i64>,
}

/// Tracks the last dispatch time for every `(kind, symbol)` pair and gates
/// new dispatches against the configured cooldown.
pub struct CooldownTable {
    state: RwLock<Inner>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Inner {
                last_dispatch_ms: HashMap::new(),
            }),
        }
    }

    /// Returns true if an alert of this kind/symbol may be dispatched now,
    /// and immediately records the dispatch (so a failed send does not
    /// resurrect the cooldown and trigger a retry storm).
    pub fn try_acquire(&self, kind: AlertKind, symbol: &str, now_ms: i64, cooldown_sec: u64) -> bool {
        let key = (kind, symbol.to_string());
        let mut s = self.state.write();
        if let Some(&last) = s.last_dispatch_ms.get(&key) {
            if now_ms - last < cooldown_sec as i64 * 1000 {
                return false;
            }
        }
        s.last_dispatch_ms.insert(key, now_ms);
        debug!(%kind, symbol, "cooldown acquired");
        true
    }

    /// Drop entries older than 24 hours.
    pub fn sweep(&self, now_ms: i64) {
        let mut s = self.state.write();
        s.last_dispatch_ms
            .retain(|_, &mut last| now_ms - last < STALE_ENTRY_MAX_AGE_MS);
    }
}

impl Default for CooldownTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_dispatch_within_cooldown_is_blocked() {
        let table = CooldownTable::new();
        assert!(table.try_acquire(AlertKind::LiqStorm, "BTCUSDT", 1_000, 300));
        assert!(!table.try_acquire(AlertKind::LiqStorm, "BTCUSDT", 1_500, 300));
    }

    #[test]
    fn dispatch_after_cooldown_elapses_is_allowed() {
        let table = CooldownTable::new();
        assert!(table.try_acquire(AlertKind::LiqStorm, "BTCUSDT", 1_000, 300));
        assert!(table.try_acquire(AlertKind::LiqStorm, "BTCUSDT", 301_001, 300));
    }

    #[test]
    fn different_symbols_have_independent_cooldowns() {
        let table = CooldownTable::new();
        assert!(table.try_acquire(AlertKind::LiqStorm, "BTCUSDT", 1_000, 300));
        assert!(table.try_acquire(AlertKind::LiqStorm, "ETHUSDT", 1_000, 300));
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let table = CooldownTable::new();
        table.try_acquire(AlertKind::LiqStorm, "BTCUSDT", 0, 300);
        table.sweep(STALE_ENTRY_MAX_AGE_MS + 1);
        // After the sweep the old entry is gone, so acquiring again succeeds
        // even though in wall-clock terms it'd otherwise still be cooling down.
        assert!(table.try_acquire(AlertKind::LiqStorm, "BTCUSDT", STALE_ENTRY_MAX_AGE_MS + 1, 300));
    }
}
