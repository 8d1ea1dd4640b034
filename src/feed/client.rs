// =============================================================================
// Feed client -- maintains one upstream WebSocket connection, auto-reconnects
// with backoff, and hands decoded events to the aggregator.
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregator::EventAggregator;
use crate::alert::AlertEngine;
use crate::error::EngineError;
use crate::feed::heartbeat::HeartbeatTracker;
use crate::feed::wire::{decode_frame, Frame};

const RECONNECT_BASE_DELAY_SEC: u64 = 2;
const RECONNECT_MAX_DELAY_SEC: u64 = 60;
const RECONNECT_MAX_ATTEMPTS: u32 = 10;
const CONNECT_TIMEOUT_SEC: u64 = 30;

pub struct FeedClient {
    ws_url: String,
    api_key: String,
    channels: Vec<String>,
    aggregator: Arc<EventAggregator>,
    alert_engine: Arc<AlertEngine>,
    reconnect_attempts: AtomicUsize,
    ws_ping_interval_sec: u64,
    ws_min_ping_interval_sec: u64,
    ws_max_ping_interval_sec: u64,
    ws_pong_timeout_sec: u64,
}

impl FeedClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ws_url: impl Into<String>,
        api_key: impl Into<String>,
        channels: Vec<String>,
        aggregator: Arc<EventAggregator>,
        alert_engine: Arc<AlertEngine>,
        ws_ping_interval_sec: u64,
        ws_min_ping_interval_sec: u64,
        ws_max_ping_interval_sec: u64,
        ws_pong_timeout_sec: u64,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
            channels,
            aggregator,
            alert_engine,
            reconnect_attempts: AtomicUsize::new(0),
            ws_ping_interval_sec,
            ws_min_ping_interval_sec,
            ws_max_ping_interval_sec,
            ws_pong_timeout_sec,
        }
    }

    fn connect_url(&self) -> String {
        format!("{}?cg-api-key={}", self.ws_url, self.api_key)
    }

    /// Run the connect/read/reconnect loop until a terminal error is hit.
    pub async fn run(&self) -> Result<(), EngineError> {
        loop {
            match self.run_once().await {
                Ok(()) => {
                    info!("feed connection closed cleanly, reconnecting");
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "feed connection error, will reconnect");
                }
            }

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt as u32 > RECONNECT_MAX_ATTEMPTS {
                error!("reconnect attempts exhausted");
                return Err(EngineError::TerminalReconnect);
            }
            let delay = backoff_delay(attempt as u32);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    #[instrument(skip(self), name = "feed::connect")]
    async fn run_once(&self) -> Result<(), EngineError> {
        let url = self.connect_url();
        let (ws_stream, _resp) = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SEC),
            connect_async(&url),
        )
        .await
        .map_err(|_| EngineError::TransientNetwork("connect timed out".to_string()))?
        .map_err(|e| EngineError::TransientNetwork(e.to_string()))?;

        self.reconnect_attempts.store(0, Ordering::SeqCst);
        info!("feed connected");

        let (mut write, mut read) = ws_stream.split();

        for channel in &self.channels {
            let msg = json!({ "op": "subscribe", "args": [channel] });
            write
                .send(Message::Text(msg.to_string()))
                .await
                .map_err(|e| EngineError::TransientNetwork(e.to_string()))?;
        }

        let mut heartbeat = HeartbeatTracker::new(
            self.ws_ping_interval_sec,
            self.ws_min_ping_interval_sec,
            self.ws_max_ping_interval_sec,
            self.ws_pong_timeout_sec,
        );
        let mut timeout_check = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, &mut heartbeat).await;
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) => {
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(EngineError::TransientNetwork(e.to_string()));
                        }
                        None => return Ok(()),
                    }
                }
                _ = tokio::time::sleep(heartbeat.interval()) => {
                    heartbeat.mark_sent(std::time::Instant::now());
                    if write.send(Message::Text("ping".to_string())).await.is_err() {
                        return Err(EngineError::TransientNetwork("failed to send heartbeat".to_string()));
                    }
                }
                _ = timeout_check.tick() => {
                    if heartbeat.check_timeout(std::time::Instant::now()) {
                        warn!("heartbeat ping went unanswered within the pong timeout");
                    }
                    if heartbeat.is_dead() {
                        return Err(EngineError::TransientNetwork("heartbeat exhausted, no pong replies".to_string()));
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str, heartbeat: &mut HeartbeatTracker) {
        let frame = match decode_frame(text) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        match frame {
            Frame::Pong | Frame::Ping => {
                heartbeat.record_reply(std::time::Instant::now());
            }
            Frame::SubscribeAck => {}
            Frame::Error(msg) => warn!(error = %msg, "feed reported an error frame"),
            Frame::Liquidations(events) => {
                for e in events {
                    self.alert_engine.notify_liquidation(&e).await;
                    self.aggregator.add_liquidation(e);
                }
            }
            Frame::Trades(events) => {
                for e in events {
                    self.alert_engine.notify_trade(&e).await;
                    self.aggregator.add_trade(e);
                }
            }
            Frame::Unroutable => {}
        }
    }
}

fn backoff_delay(attempt: u32) -> u64 {
    let raw = RECONNECT_BASE_DELAY_SEC.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    raw.min(RECONNECT_MAX_DELAY_SEC)
}
