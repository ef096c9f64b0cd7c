use crate::error::BotError;
use crate::models::MarginType;
use crate::Result;
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Process-wide settings, loaded once at startup and immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub binance: BinanceSettings,
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,
    #[serde(default)]
    pub trading: TradingSettings,
}

#[derive(Clone, Deserialize)]
pub struct BinanceSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
    pub secret: String,
    #[serde(default = "default_margin_type")]
    pub margin_type: MarginType,
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    /// Per-side commission, e.g. 0.001 = 0.1%
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
    /// e.g. 0.004 = 0.4%
    #[serde(default = "default_target_profit_percent")]
    pub target_profit_percent: Decimal,
    /// Signed-request freshness tolerance (ms)
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl fmt::Debug for BinanceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("margin_type", &self.margin_type)
            .field("default_leverage", &self.default_leverage)
            .field("commission_rate", &self.commission_rate)
            .field("target_profit_percent", &self.target_profit_percent)
            .field("recv_window", &self.recv_window)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_entry_interval_secs")]
    pub entry_interval_secs: u64,
    #[serde(default = "default_exit_interval_secs")]
    pub exit_interval_secs: u64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            entry_interval_secs: default_entry_interval_secs(),
            exit_interval_secs: default_exit_interval_secs(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_margin_type() -> MarginType {
    MarginType::Crossed
}
fn default_leverage() -> u32 {
    10
}
fn default_commission_rate() -> Decimal {
    Decimal::new(1, 3)
}
fn default_target_profit_percent() -> Decimal {
    Decimal::new(4, 3)
}
fn default_recv_window() -> u64 {
    5000
}
fn default_requests_per_minute() -> u32 {
    1200
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_telegram_api() -> String {
    DEFAULT_TELEGRAM_API.to_string()
}
fn default_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "XRPUSDT", "SOLUSDT", "SUIUSDT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_entry_interval_secs() -> u64 {
    15 * 60
}
fn default_exit_interval_secs() -> u64 {
    60
}

impl Settings {
    /// Load settings from `config/default.toml`, `config/local.toml` (both
    /// optional) and `BOT__`-prefixed environment variables, in that order.
    ///
    /// # Example
    /// `BOT__BINANCE__API_KEY=... BOT__TRADING__SYMBOLS=BTCUSDT,ETHUSDT`
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("BOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("trading.symbols"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.binance;
        if b.api_key.trim().is_empty() || b.secret.trim().is_empty() {
            return Err(invalid("binance.api_key and binance.secret must be set"));
        }
        if !(1..=125).contains(&b.default_leverage) {
            return Err(invalid(format!(
                "binance.default_leverage must be in 1..=125, got {}",
                b.default_leverage
            )));
        }
        if b.commission_rate.is_sign_negative() || b.target_profit_percent.is_sign_negative() {
            return Err(invalid("commission_rate and target_profit_percent must be >= 0"));
        }
        if !(1..=60_000).contains(&b.recv_window) {
            return Err(invalid(format!(
                "binance.recv_window must be in 1..=60000 ms, got {}",
                b.recv_window
            )));
        }
        if b.requests_per_minute == 0 || b.request_timeout_secs == 0 {
            return Err(invalid(
                "binance.requests_per_minute and binance.request_timeout_secs must be positive",
            ));
        }
        if self.trading.symbols.is_empty() {
            return Err(invalid("trading.symbols must not be empty"));
        }
        if self.trading.entry_interval_secs == 0 || self.trading.exit_interval_secs == 0 {
            return Err(invalid("trading intervals must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> BotError {
    BotError::Config(config::ConfigError::Message(msg.into()))
}
