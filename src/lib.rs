// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod metadata;
pub mod models;
pub mod notify;
pub mod strategy;

// Re-export commonly used types
pub use crate::api::BinanceClient;
pub use crate::config::Settings;
pub use crate::error::BotError;
pub use crate::metadata::{SymbolFilter, SymbolMetadataCache};
pub use crate::models::*;
pub use crate::strategy::{AutoTrader, EntryOutcome, ExitOutcome};

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;

use std::sync::Arc;

use crate::execution::{OrderExecutor, OrderSettings, PositionStateEvaluator, ProfitTarget};
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::strategy::RsiEntryEvaluator;

/// Wire the trading core from settings.
///
/// Syncs exchange time and loads the symbol metadata cache before returning,
/// so both are fixed for the rest of the process.
pub async fn build_auto_trader(settings: &Settings) -> Result<AutoTrader> {
    let client = Arc::new(BinanceClient::new(&settings.binance)?);
    client.sync_time().await?;

    let metadata = Arc::new(SymbolMetadataCache::load(&client).await?);

    let notifier: Arc<dyn Notifier> = match &settings.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram)?),
        None => {
            tracing::warn!("Telegram not configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    Ok(assemble(client, metadata, settings, notifier))
}

/// Assemble the core from already-built parts.
pub fn assemble(
    client: Arc<BinanceClient>,
    metadata: Arc<SymbolMetadataCache>,
    settings: &Settings,
    notifier: Arc<dyn Notifier>,
) -> AutoTrader {
    let positions = PositionStateEvaluator::new(
        client.clone(),
        ProfitTarget {
            commission_rate: settings.binance.commission_rate,
            target_profit_percent: settings.binance.target_profit_percent,
        },
        notifier.clone(),
    );
    let entry = RsiEntryEvaluator::new(client.clone());
    let executor = OrderExecutor::new(
        client,
        metadata,
        OrderSettings {
            margin_type: settings.binance.margin_type,
            leverage: settings.binance.default_leverage,
        },
        notifier,
    );

    AutoTrader::new(positions, entry, executor)
}
