/// Module gửi thông báo cho hypersniper
///
/// - watch: theo dõi token/global và phát snapshot tới từng subscriber
/// - webhook: POST snapshot tới webhook bên ngoài
/// - exit_notifier: báo cho chủ vị thế khi quy tắc auto-exit bắn
///
/// Chat delivery goes through `MessageSender`; `TelegramChannel` is used when a
/// bot token is configured, `LogChannel` otherwise.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::errors::{Result, SniperError};
use crate::types::SubscriberId;

pub mod exit_notifier;
pub mod watch;
pub mod webhook;

pub use exit_notifier::AutoExitNotifier;
pub use watch::{DispatchReport, NotificationFanout};
pub use webhook::WebhookDispatcher;

/// Chat transport
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Send one HTML-formatted message to a chat
    async fn send(&self, recipient: SubscriberId, text: &str) -> Result<()>;
}

/// Escape text for Telegram HTML parse mode
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Kênh thông báo Telegram
pub struct TelegramChannel {
    /// Bot token
    token: String,
    /// HTTP client
    client: Client,
    api_base: String,
}

impl TelegramChannel {
    /// Tạo mới kênh thông báo Telegram
    pub fn new(token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("Không thể tạo HTTP client cho Telegram: {}. Sử dụng client mặc định.", e);
                Client::new()
            });

        Self {
            token,
            client,
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// Override the Bot API base URL (local bot API server)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MessageSender for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, recipient: SubscriberId, text: &str) -> Result<()> {
        let api_url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let params = json!({
            "chat_id": recipient,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(&api_url)
            .json(&params)
            .send()
            .await
            .map_err(|e| SniperError::delivery(recipient, e))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let description = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(SniperError::delivery(
                recipient,
                format!("HTTP {}: {}", status, description),
            ));
        }

        debug!("Telegram message delivered to {}", recipient);
        Ok(())
    }
}

/// Writes messages to the log; used when no bot token is configured
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl MessageSender for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, recipient: SubscriberId, text: &str) -> Result<()> {
        info!(recipient, "{}", text);
        Ok(())
    }
}

/// Telegram when a token is configured, log channel otherwise
pub fn create_sender(telegram_bot_token: Option<&str>) -> Arc<dyn MessageSender> {
    match telegram_bot_token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => {
            info!("Chat delivery via Telegram");
            Arc::new(TelegramChannel::new(token.to_string()))
        }
        None => {
            warn!("No Telegram bot token configured, chat messages will only be logged");
            Arc::new(LogChannel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>A&B</b>"), "&lt;b&gt;A&amp;B&lt;/b&gt;");
    }

    #[tokio::test]
    async fn test_unreachable_bot_api_is_delivery_failure() {
        let channel = TelegramChannel::new("123:abc".to_string()).with_api_base("http://127.0.0.1:9/");
        let err = channel.send(42, "hello").await.unwrap_err();
        assert!(matches!(err, SniperError::DeliveryFailure { ref recipient, .. } if recipient == "42"));
        assert_eq!(create_sender(None).name(), "log");
        assert_eq!(create_sender(Some("  ")).name(), "log");
    }
}
