// Outbound operator notifications (best-effort)
pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::error::BotError;
use async_trait::async_trait;

/// Message sink for trade events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<(), BotError>;
}

/// Deliver `text`, logging and swallowing any failure.
///
/// Trading decisions never depend on whether a notification arrived.
pub async fn notify(notifier: &dyn Notifier, text: &str) {
    if let Err(e) = notifier.send_message(text).await {
        tracing::warn!(error = %e, "Notification not delivered");
    }
}

/// Writes notifications to the log. Used when no Telegram bot is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_message(&self, text: &str) -> Result<(), BotError> {
        tracing::info!(target: "futuresbot::notify", "📨 {}", text);
        Ok(())
    }
}
