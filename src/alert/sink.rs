// =============================================================================
// Chat sink -- send-only transport for rendered alert text.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

/// A destination capable of receiving plaintext alert messages. The core only
/// depends on this trait; concrete transports are an external collaborator.
#[async_trait::async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Telegram-shaped HTTP sink. No retries: a failed send is logged and the
/// caller's cooldown bookkeeping still treats the alert as dispatched.
pub struct TelegramSink {
    token: String,
    client: reqwest::Client,
}

impl TelegramSink {
    pub fn new(token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");

        Self {
            token: token.into(),
            client,
        }
    }

    fn send_url(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.token)
    }
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink").field("token", &"<redacted>").finish()
    }
}

#[async_trait::async_trait]
impl ChatSink for TelegramSink {
    #[instrument(skip(self, text), name = "telegram::send")]
    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let resp = self
            .client
            .post(self.send_url())
            .json(&body)
            .send()
            .await
            .context("failed to reach chat sink")?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), chat_id, "chat sink rejected message");
            anyhow::bail!("chat sink returned status {}", resp.status());
        }

        debug!(chat_id, "alert dispatched to chat sink");
        Ok(())
    }
}
