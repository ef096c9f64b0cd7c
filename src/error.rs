use thiserror::Error;

/// Errors surfaced by the trading core.
///
/// Everything that touches the exchange is propagated to the caller (the
/// per-tick driver). Notification failures are the one exception: they are
/// logged where they happen and never returned from a trading operation.
#[derive(Debug, Error)]
pub enum BotError {
    /// Network or I/O failure before a response was received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The exchange answered with a non-success status.
    #[error("exchange API error ({method} {path}): {status_code} - {body}")]
    ExchangeApi {
        method: String,
        path: String,
        status_code: u16,
        body: String,
    },

    /// A 2xx response whose body did not match the expected schema.
    #[error("malformed response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no exchange metadata cached for {0}")]
    MissingMetadata(String),

    /// Average loss over the RSI window is zero, so RS is undefined.
    #[error("RSI undefined: average loss is zero over {period} periods")]
    MathematicalDegeneracy { period: usize },

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("request signing failed: {0}")]
    Signing(String),
}

#[derive(serde::Deserialize)]
struct ExchangeErrorBody {
    code: i64,
}

impl BotError {
    /// Numeric error code from an exchange error body such as
    /// `{"code":-4046,"msg":"No need to change margin type."}`.
    pub fn exchange_code(&self) -> Option<i64> {
        match self {
            BotError::ExchangeApi { body, .. } => serde_json::from_str::<ExchangeErrorBody>(body)
                .ok()
                .map(|b| b.code),
            _ => None,
        }
    }
}
