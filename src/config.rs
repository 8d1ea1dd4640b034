// =============================================================================
// Runtime configuration loaded once from the environment at startup.
// =============================================================================

use std::collections::HashSet;
use std::env;

use anyhow::{bail, Context, Result};

use crate::auth::credentials_distinct;
use crate::types::SymbolGroup;

fn default_majors() -> Vec<&'static str> {
    vec!["BTCUSDT", "ETHUSDT"]
}

fn default_large_cap() -> Vec<&'static str> {
    vec![
        "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT", "DOGEUSDT", "AVAXUSDT", "LINKUSDT",
        "TONUSDT",
    ]
}

/// USD / count / cooldown thresholds for one detector, for one symbol group.
#[derive(Debug, Clone, Copy)]
pub struct GroupThresholds {
    pub liq_min_usd: f64,
    pub whale_min_usd: f64,
    pub storm_usd: f64,
    pub storm_count: usize,
    pub storm_cooldown_sec: u64,
    pub cluster_usd: f64,
    pub cluster_count: usize,
    pub cluster_dominance_min: f64,
    pub cluster_cooldown_sec: u64,
    pub convergence_bonus: f64,
    pub radar_score_min: f64,
}

impl GroupThresholds {
    fn for_group(group: SymbolGroup) -> Self {
        match group {
            SymbolGroup::Majors => Self {
                liq_min_usd: 100_000.0,
                whale_min_usd: 500_000.0,
                storm_usd: 2_000_000.0,
                storm_count: 3,
                storm_cooldown_sec: 300,
                cluster_usd: 3_000_000.0,
                cluster_count: 3,
                cluster_dominance_min: 0.70,
                cluster_cooldown_sec: 600,
                convergence_bonus: 0.30,
                radar_score_min: 0.7,
            },
            SymbolGroup::LargeCap => Self {
                liq_min_usd: 50_000.0,
                whale_min_usd: 250_000.0,
                storm_usd: 1_000_000.0,
                storm_count: 2,
                storm_cooldown_sec: 450,
                cluster_usd: 1_500_000.0,
                cluster_count: 2,
                cluster_dominance_min: 0.65,
                cluster_cooldown_sec: 900,
                convergence_bonus: 0.25,
                radar_score_min: 0.6,
            },
            SymbolGroup::MidCap => Self {
                liq_min_usd: 20_000.0,
                whale_min_usd: 100_000.0,
                storm_usd: 500_000.0,
                storm_count: 2,
                storm_cooldown_sec: 600,
                cluster_usd: 500_000.0,
                cluster_count: 2,
                cluster_dominance_min: 0.60,
                cluster_cooldown_sec: 1200,
                convergence_bonus: 0.20,
                radar_score_min: 0.5,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolGroups {
    majors: HashSet<String>,
    large_cap: HashSet<String>,
}

impl SymbolGroups {
    fn from_env() -> Self {
        let majors = env_csv("SYMBOL_GROUP_MAJORS")
            .unwrap_or_else(|| default_majors().into_iter().map(str::to_string).collect());
        let large_cap = env_csv("SYMBOL_GROUP_LARGE_CAP").unwrap_or_else(|| {
            default_large_cap()
                .into_iter()
                .map(str::to_string)
                .collect()
        });
        Self {
            majors: majors.into_iter().collect(),
            large_cap: large_cap.into_iter().collect(),
        }
    }

    pub fn group_for(&self, symbol: &str) -> SymbolGroup {
        if self.majors.contains(symbol) {
            SymbolGroup::Majors
        } else if self.large_cap.contains(symbol) {
            SymbolGroup::LargeCap
        } else {
            SymbolGroup::MidCap
        }
    }

    pub fn thresholds_for(&self, symbol: &str) -> GroupThresholds {
        GroupThresholds::for_group(self.group_for(symbol))
    }
}

fn env_csv(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Immutable process configuration, built once at startup from the
/// environment and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_ws_url: String,
    pub feed_api_key: String,
    pub chat_sink_token: String,
    pub chat_sink_chat_ids: Vec<String>,

    pub ws_ping_interval_sec: u64,
    pub ws_min_ping_interval_sec: u64,
    pub ws_max_ping_interval_sec: u64,
    pub ws_pong_timeout_sec: u64,

    pub aggregator_max_memory_mb: u64,
    pub symbol_groups: SymbolGroups,

    pub liq_min_usd_override: Option<f64>,
    pub whale_min_usd_override: Option<f64>,
}

impl AppConfig {
    /// Load configuration from the process environment, applying defaults
    /// for everything optional, then validate it.
    pub fn from_env() -> Result<Self> {
        let feed_api_key =
            env::var("FEED_API_KEY").context("FEED_API_KEY is required but not set")?;
        let chat_sink_token =
            env::var("CHAT_SINK_TOKEN").context("CHAT_SINK_TOKEN is required but not set")?;
        let chat_sink_chat_ids = env_csv("CHAT_SINK_CHAT_IDS")
            .filter(|v| !v.is_empty())
            .context("CHAT_SINK_CHAT_IDS is required and must list at least one chat id")?;

        let feed_ws_url = env::var("FEED_WS_URL")
            .unwrap_or_else(|_| "wss://open-ws.coinglass.com/ws-api".to_string());

        let cfg = Self {
            feed_ws_url,
            feed_api_key,
            chat_sink_token,
            chat_sink_chat_ids,
            ws_ping_interval_sec: env_or("WS_PING_INTERVAL_SEC", 20),
            ws_min_ping_interval_sec: env_or("WS_MIN_PING_INTERVAL_SEC", 10),
            ws_max_ping_interval_sec: env_or("WS_MAX_PING_INTERVAL_SEC", 60),
            ws_pong_timeout_sec: env_or("WS_PONG_TIMEOUT_SEC", 60),
            aggregator_max_memory_mb: env_or("AGGREGATOR_MAX_MEMORY_MB", 512),
            symbol_groups: SymbolGroups::from_env(),
            liq_min_usd_override: env::var("LIQ_MIN_USD_OVERRIDE").ok().and_then(|v| v.parse().ok()),
            whale_min_usd_override: env::var("WHALE_MIN_USD_OVERRIDE")
                .ok()
                .and_then(|v| v.parse().ok()),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if !credentials_distinct(&self.chat_sink_token, &self.feed_api_key) {
            bail!("CHAT_SINK_TOKEN must not equal FEED_API_KEY");
        }
        if self.chat_sink_chat_ids.is_empty() {
            bail!("at least one chat id is required in CHAT_SINK_CHAT_IDS");
        }
        if self.ws_min_ping_interval_sec > self.ws_max_ping_interval_sec {
            bail!("WS_MIN_PING_INTERVAL_SEC must be <= WS_MAX_PING_INTERVAL_SEC");
        }
        Ok(())
    }

    pub fn thresholds_for(&self, symbol: &str) -> GroupThresholds {
        let mut t = self.symbol_groups.thresholds_for(symbol);
        if let Some(liq) = self.liq_min_usd_override {
            t.liq_min_usd = liq;
        }
        if let Some(whale) = self.whale_min_usd_override {
            t.whale_min_usd = whale;
        }
        t
    }
}

#[cfg(test)]
/// Build a fixed config for tests without touching process environment
/// variables (avoids races between tests run in parallel).
pub fn test_config() -> AppConfig {
    AppConfig {
        feed_ws_url: "wss://example.invalid/ws".to_string(),
        feed_api_key: "test-feed-key".to_string(),
        chat_sink_token: "test-sink-token".to_string(),
        chat_sink_chat_ids: vec!["1".to_string(), "2".to_string()],
        ws_ping_interval_sec: 20,
        ws_min_ping_interval_sec: 10,
        ws_max_ping_interval_sec: 60,
        ws_pong_timeout_sec: 60,
        aggregator_max_memory_mb: 512,
        symbol_groups: SymbolGroups {
            majors: ["BTCUSDT".to_string(), "ETHUSDT".to_string()]
                .into_iter()
                .collect(),
            large_cap: default_large_cap().into_iter().map(str::to_string).collect(),
        },
        liq_min_usd_override: None,
        whale_min_usd_override: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_defaults_to_mid_cap() {
        let groups = SymbolGroups {
            majors: ["BTCUSDT".to_string()].into_iter().collect(),
            large_cap: ["SOLUSDT".to_string()].into_iter().collect(),
        };
        assert_eq!(groups.group_for("BTCUSDT"), SymbolGroup::Majors);
        assert_eq!(groups.group_for("SOLUSDT"), SymbolGroup::LargeCap);
        assert_eq!(groups.group_for("SOMERANDOMCOIN"), SymbolGroup::MidCap);
    }

    #[test]
    fn majors_have_tighter_cooldowns_than_mid_cap() {
        let majors = GroupThresholds::for_group(SymbolGroup::Majors);
        let mid = GroupThresholds::for_group(SymbolGroup::MidCap);
        assert!(majors.storm_cooldown_sec < mid.storm_cooldown_sec);
        assert!(majors.storm_usd > mid.storm_usd);
    }
}
