// Per-symbol order constraints, loaded once from exchangeInfo

use crate::api::types::{ExchangeInfo, SymbolFilterRaw};
use crate::api::{BinanceClient, QueryParams, EXCHANGE_INFO_PATH};
use crate::error::BotError;
use crate::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

const FALLBACK_MIN_NOTIONAL: i64 = 5;
const FALLBACK_QUANTITY_PRECISION: u32 = 1;

/// Quantity constraints for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFilter {
    pub symbol: String,
    /// Always > 0
    pub min_notional: Decimal,
    /// Decimal places allowed in an order quantity. Always >= 1.
    pub quantity_precision: u32,
}

/// Read-only map of symbol filters.
///
/// Built once at startup and never refreshed. If the exchange changes its
/// filters mid-session the stale values stay in effect until restart.
#[derive(Debug, Clone, Default)]
pub struct SymbolMetadataCache {
    filters: HashMap<String, SymbolFilter>,
}

impl SymbolMetadataCache {
    /// Fetch exchangeInfo and build the cache.
    pub async fn load(client: &BinanceClient) -> Result<Self> {
        tracing::info!("Loading exchange symbol metadata...");
        let info: ExchangeInfo = client
            .get_json(EXCHANGE_INFO_PATH, &QueryParams::new())
            .await?;
        let cache = Self::from_exchange_info(info);
        tracing::info!("✅ Cached filters for {} symbols", cache.len());
        Ok(cache)
    }

    pub fn from_exchange_info(info: ExchangeInfo) -> Self {
        let filters = info
            .symbols
            .into_iter()
            .map(|s| {
                let filter = build_filter(&s.symbol, &s.filters);
                (s.symbol, filter)
            })
            .collect();
        Self { filters }
    }

    pub fn from_filters(filters: impl IntoIterator<Item = SymbolFilter>) -> Self {
        Self {
            filters: filters
                .into_iter()
                .map(|f| (f.symbol.clone(), f))
                .collect(),
        }
    }

    /// Look up a symbol. Absence is an error, never a default.
    pub fn get(&self, symbol: &str) -> Result<&SymbolFilter> {
        self.filters
            .get(symbol)
            .ok_or_else(|| BotError::MissingMetadata(symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

fn build_filter(symbol: &str, raw: &[SymbolFilterRaw]) -> SymbolFilter {
    let mut min_notional = Decimal::ZERO;
    let mut precision: u32 = 0;

    for f in raw {
        match f {
            SymbolFilterRaw::MinNotional { notional } => {
                min_notional = notional
                    .as_deref()
                    .and_then(|n| Decimal::from_str(n).ok())
                    .unwrap_or(Decimal::ZERO);
            }
            SymbolFilterRaw::LotSize { step_size } => {
                precision = step_scale(step_size);
            }
            SymbolFilterRaw::Other => {}
        }
    }

    if min_notional <= Decimal::ZERO {
        tracing::debug!(symbol, "MIN_NOTIONAL missing or zero, using fallback 5.0");
        min_notional = Decimal::from(FALLBACK_MIN_NOTIONAL);
    }

    let quantity_precision = if precision == 0 {
        FALLBACK_QUANTITY_PRECISION
    } else {
        precision
    };

    SymbolFilter {
        symbol: symbol.to_string(),
        min_notional,
        quantity_precision,
    }
}

/// Scale of a step size after stripping trailing zeros ("0.00100000" -> 3).
/// Whole-number steps yield 0.
fn step_scale(step_size: &str) -> u32 {
    match Decimal::from_str(step_size) {
        Ok(step) => step.normalize().scale(),
        Err(e) => {
            tracing::warn!(step_size, error = %e, "Unparseable LOT_SIZE stepSize");
            0
        }
    }
}
