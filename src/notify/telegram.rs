use super::Notifier;
use crate::config::TelegramSettings;
use crate::error::BotError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Client for the Telegram Bot API `sendMessage` method
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self, BotError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    /// Endpoint: GET /bot{token}/sendMessage?chat_id={chat_id}&text={text}
    async fn send_message(&self, text: &str) -> Result<(), BotError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .client
            .get(&url)
            .query(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await
            .map_err(|e| BotError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Notification(format!(
                "Telegram API error ({}): {}",
                status, body
            )));
        }

        tracing::debug!("Telegram message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(api_base: String) -> TelegramSettings {
        TelegramSettings {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
            api_base,
        }
    }

    #[tokio::test]
    async fn test_message_sent_url_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bot123:abc/sendMessage")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("chat_id".into(), "42".into()),
                Matcher::UrlEncoded("text".into(), "BTCUSDT & friends\nline 2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(server.url())).unwrap();
        notifier
            .send_message("BTCUSDT & friends\nline 2")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bot123:abc/sendMessage")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"chat not found"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&settings(server.url())).unwrap();
        let err = notifier.send_message("hi").await.unwrap_err();
        assert!(matches!(err, BotError::Notification(ref m) if m.contains("chat not found")));
    }
}
