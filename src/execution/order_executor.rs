use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::api::types::{DualSidePosition, OrderAck, PremiumIndex};
use crate::api::{
    BinanceClient, QueryParams, ALL_OPEN_ORDERS_PATH, DUAL_SIDE_PATH, LEVERAGE_PATH,
    MARGIN_TYPE_PATH, ORDER_PATH, PREMIUM_INDEX_PATH,
};
use crate::error::BotError;
use crate::execution::position_state::fetch_positions;
use crate::metadata::{SymbolFilter, SymbolMetadataCache};
use crate::models::{MarginType, OrderRequest, OrderSide, Position};
use crate::notify::{notify, Notifier};
use crate::Result;

/// Exchange code for "No need to change margin type."
const MARGIN_TYPE_UNCHANGED: i64 = -4046;

/// Head-room over the exchange minimum notional for auto-sized orders (5%).
fn notional_headroom() -> Decimal {
    Decimal::new(105, 2)
}

/// Account setup applied before every opening order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderSettings {
    pub margin_type: MarginType,
    pub leverage: u32,
}

/// Smallest quantity at `symbol`'s precision whose notional is at least
/// `min_notional * 1.05`.
///
/// Rounds up: a quantity rounded down could fall below the exchange minimum
/// and be rejected. The result always carries exactly `quantity_precision`
/// decimal places.
pub fn compute_auto_quantity(filter: &SymbolFilter, mark_price: Decimal) -> Result<Decimal> {
    if mark_price <= Decimal::ZERO {
        return Err(BotError::InvalidInput(format!(
            "mark price for {} must be positive, got {}",
            filter.symbol, mark_price
        )));
    }

    let target_notional = filter.min_notional * notional_headroom();
    let raw_quantity = target_notional.checked_div(mark_price).ok_or_else(|| {
        BotError::InvalidInput(format!(
            "quantity overflow for {} at mark price {}",
            filter.symbol, mark_price
        ))
    })?;

    let mut quantity = raw_quantity
        .round_dp_with_strategy(filter.quantity_precision, RoundingStrategy::AwayFromZero);
    quantity.rescale(filter.quantity_precision);
    Ok(quantity)
}

/// Operator-supplied quantity checked against `symbol`'s precision.
///
/// More decimal places than `quantity_precision` is an error; fewer are
/// padded so the order carries exactly that scale.
pub fn normalize_quantity(filter: &SymbolFilter, quantity: &str) -> Result<Decimal> {
    let mut parsed: Decimal = quantity.trim().parse().map_err(|e| {
        BotError::InvalidInput(format!("bad quantity {:?} for {}: {}", quantity, filter.symbol, e))
    })?;
    if parsed <= Decimal::ZERO {
        return Err(BotError::InvalidInput(format!(
            "quantity for {} must be positive, got {}",
            filter.symbol, quantity
        )));
    }

    let parsed_scale = parsed.normalize().scale();
    if parsed_scale > filter.quantity_precision {
        return Err(BotError::InvalidInput(format!(
            "quantity {} for {} exceeds {} decimal places",
            quantity, filter.symbol, filter.quantity_precision
        )));
    }

    parsed.rescale(filter.quantity_precision);
    Ok(parsed)
}

/// Market orders that flatten the open positions of `symbol`.
///
/// Each position is closed with the order side opposite to its direction,
/// tagged with the position's own `positionSide` (a LONG is closed by a SELL
/// tagged LONG). With `exit_side` set, only positions that side reduces are
/// included.
pub fn closing_orders(positions: &[Position], symbol: &str, exit_side: Option<OrderSide>) -> Vec<OrderRequest> {
    positions
        .iter()
        .filter(|p| p.symbol == symbol && p.is_open())
        .filter_map(|p| {
            let side = p.direction().exit_side();
            if exit_side.is_some_and(|wanted| wanted != side) {
                return None;
            }
            Some(
                OrderRequest::market(symbol, side, p.position_amt.abs().to_string())
                    .with_position_side(p.position_side),
            )
        })
        .collect()
}

/// Submits and cancels orders.
///
/// Nothing here is idempotent against the exchange: each call submits a new
/// order. Callers invoke these at most once per symbol per tick.
pub struct OrderExecutor {
    client: Arc<BinanceClient>,
    metadata: Arc<SymbolMetadataCache>,
    settings: OrderSettings,
    notifier: Arc<dyn Notifier>,
}

impl OrderExecutor {
    pub fn new(
        client: Arc<BinanceClient>,
        metadata: Arc<SymbolMetadataCache>,
        settings: OrderSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            client,
            metadata,
            settings,
            notifier,
        }
    }

    /// Open a MARKET position.
    ///
    /// 1. Apply margin type and leverage
    /// 2. Auto-size the quantity from the mark price when none is given
    /// 3. Tag `positionSide` from the order side if the account is in hedge mode
    /// 4. Submit, then notify
    ///
    /// A given quantity is validated against the symbol's precision before
    /// any setup call. Setup calls that succeeded stay applied if a later
    /// step fails.
    pub async fn open_market_position(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Option<&str>,
    ) -> Result<OrderAck> {
        let manual = match quantity.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => Some(normalize_quantity(self.metadata.get(symbol)?, q)?),
            None => None,
        };

        self.set_margin_type(symbol).await?;
        self.set_leverage(symbol).await?;

        let quantity = match manual {
            Some(q) => q.to_string(),
            None => {
                let mark_price = self.fetch_mark_price(symbol).await?;
                let filter = self.metadata.get(symbol)?;
                let quantity = compute_auto_quantity(filter, mark_price)?;
                tracing::debug!(
                    symbol,
                    %mark_price,
                    min_notional = %filter.min_notional,
                    %quantity,
                    "Auto-sized order quantity"
                );
                quantity.to_string()
            }
        };

        let mut order = OrderRequest::market(symbol, side, quantity);
        if self.is_hedge_mode().await? {
            order = order.with_position_side(side.opening_position_side());
        }

        let ack = self.submit(&order).await?;

        let message = format!(
            "🚀 Market order submitted\nSymbol: {}\nSide: {}\nQuantity: {}\nLeverage: {}x",
            symbol, side, order.quantity, self.settings.leverage
        );
        notify(self.notifier.as_ref(), &message).await;

        Ok(ack)
    }

    /// Close open positions of `symbol` at market.
    ///
    /// `exit_side` restricts closing to positions that side reduces; `None`
    /// closes everything open on the symbol.
    pub async fn close_position_market(
        &self,
        symbol: &str,
        exit_side: Option<OrderSide>,
    ) -> Result<Vec<OrderAck>> {
        let positions = fetch_positions(&self.client, Some(symbol)).await?;
        let orders = closing_orders(&positions, symbol, exit_side);

        if orders.is_empty() {
            tracing::info!(symbol, "No matching open position to close");
        }

        let mut acks = Vec::with_capacity(orders.len());
        for order in &orders {
            let ack = self.submit(order).await?;
            tracing::info!(
                symbol,
                position_side = ?order.position_side,
                quantity = %order.quantity,
                "✅ Position closed"
            );
            acks.push(ack);
        }
        Ok(acks)
    }

    /// Cancel every open order on `symbol`.
    pub async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()> {
        let mut params = QueryParams::new();
        params.push("symbol", symbol);
        self.client.delete(ALL_OPEN_ORDERS_PATH, &params).await?;
        tracing::info!(symbol, "Cancelled all open orders");
        Ok(())
    }

    pub async fn is_hedge_mode(&self) -> Result<bool> {
        let dual: DualSidePosition = self
            .client
            .get_json(DUAL_SIDE_PATH, &QueryParams::new())
            .await?;
        Ok(dual.dual_side_position)
    }

    pub async fn fetch_mark_price(&self, symbol: &str) -> Result<Decimal> {
        let mut params = QueryParams::new();
        params.push("symbol", symbol);
        let index: PremiumIndex = self.client.get_json(PREMIUM_INDEX_PATH, &params).await?;
        Ok(index.mark_price)
    }

    async fn set_margin_type(&self, symbol: &str) -> Result<()> {
        let mut params = QueryParams::new();
        params
            .push("symbol", symbol)
            .push("marginType", self.settings.margin_type.as_str());

        match self.client.post(MARGIN_TYPE_PATH, &params).await {
            Ok(_) => Ok(()),
            Err(e) if e.exchange_code() == Some(MARGIN_TYPE_UNCHANGED) => {
                tracing::debug!(symbol, "Margin type already set");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn set_leverage(&self, symbol: &str) -> Result<()> {
        let mut params = QueryParams::new();
        params
            .push("symbol", symbol)
            .push("leverage", self.settings.leverage.to_string());
        self.client.post(LEVERAGE_PATH, &params).await?;
        Ok(())
    }

    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck> {
        let params: QueryParams = order.to_params().into_iter().collect();
        let ack: OrderAck = self.client.post_json(ORDER_PATH, &params).await?;
        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            order_id = ack.order_id,
            status = %ack.status,
            "Order accepted"
        );
        Ok(ack)
    }
}
