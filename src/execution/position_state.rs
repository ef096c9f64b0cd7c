use std::sync::Arc;

use rust_decimal::Decimal;

use crate::api::{BinanceClient, QueryParams, POSITION_RISK_PATH};
use crate::models::{Direction, Position, ProfitEvaluation};
use crate::notify::{notify, Notifier};
use crate::Result;

/// Profit target parameters, net of round-trip costs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitTarget {
    /// Per-side commission, e.g. 0.001
    pub commission_rate: Decimal,
    /// Required move before costs, e.g. 0.004
    pub target_profit_percent: Decimal,
}

impl ProfitTarget {
    /// Target price for a position entered at `entry_price`.
    ///
    /// The slippage buffer covers commission on both legs:
    /// `entry * commission * 2`. Long targets sit above
    /// `entry * (1 + pct)` by the buffer, short targets below
    /// `entry * (1 - pct)` by the same amount.
    pub fn target_price(&self, direction: Direction, entry_price: Decimal) -> Decimal {
        let slippage_buffer = entry_price * self.commission_rate * Decimal::TWO;
        match direction {
            Direction::Long => {
                entry_price * (Decimal::ONE + self.target_profit_percent) + slippage_buffer
            }
            Direction::Short => {
                entry_price * (Decimal::ONE - self.target_profit_percent) - slippage_buffer
            }
        }
    }

    pub fn evaluate(&self, position: &Position) -> ProfitEvaluation {
        let side = position.direction();
        let target_price = self.target_price(side, position.entry_price);
        let should_take_profit = match side {
            Direction::Long => position.mark_price >= target_price,
            Direction::Short => position.mark_price <= target_price,
        };

        ProfitEvaluation {
            should_take_profit,
            side,
            entry_price: position.entry_price,
            mark_price: position.mark_price,
            target_price,
        }
    }
}

/// Fetch live positions, optionally filtered to one symbol.
///
/// Positions are always read fresh from the exchange.
pub async fn fetch_positions(client: &BinanceClient, symbol: Option<&str>) -> Result<Vec<Position>> {
    let mut params = QueryParams::new();
    if let Some(symbol) = symbol {
        params.push("symbol", symbol);
    }
    let positions: Vec<Position> = client.get_json(POSITION_RISK_PATH, &params).await?;
    Ok(match symbol {
        Some(symbol) => positions.into_iter().filter(|p| p.symbol == symbol).collect(),
        None => positions,
    })
}

/// Decides whether a symbol has an open position and whether it hit its target.
pub struct PositionStateEvaluator {
    client: Arc<BinanceClient>,
    target: ProfitTarget,
    notifier: Arc<dyn Notifier>,
}

impl PositionStateEvaluator {
    pub fn new(client: Arc<BinanceClient>, target: ProfitTarget, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            target,
            notifier,
        }
    }

    /// Open iff some position for `symbol` has a non-zero amount.
    pub async fn has_open_position(&self, symbol: &str) -> Result<bool> {
        let positions = fetch_positions(&self.client, Some(symbol)).await?;
        Ok(positions.iter().any(Position::is_open))
    }

    /// Evaluate the first open position for `symbol` against the profit target.
    ///
    /// Returns `None` when nothing is open. When the target is met a
    /// notification is sent before returning; its delivery does not affect
    /// the result.
    pub async fn evaluate_profit_target(&self, symbol: &str) -> Result<Option<ProfitEvaluation>> {
        let positions = fetch_positions(&self.client, Some(symbol)).await?;
        let Some(position) = positions.iter().find(|p| p.is_open()) else {
            return Ok(None);
        };

        let evaluation = self.target.evaluate(position);
        tracing::debug!(
            symbol,
            side = %evaluation.side,
            entry = %evaluation.entry_price,
            mark = %evaluation.mark_price,
            target = %evaluation.target_price,
            hit = evaluation.should_take_profit,
            "Profit target evaluated"
        );

        if evaluation.should_take_profit {
            tracing::info!(symbol, target = %evaluation.target_price, "💰 Profit target reached");
            let message = format!(
                "💰 Profit target reached: {}\nSide: {}\nEntry: {:.2}\nMark: {:.2}\nTarget: {:.2}",
                symbol,
                evaluation.side,
                evaluation.entry_price,
                evaluation.mark_price,
                evaluation.target_price
            );
            notify(self.notifier.as_ref(), &message).await;
        }

        Ok(Some(evaluation))
    }

    /// Symbols that currently hold a non-zero position, deduplicated.
    pub async fn open_position_symbols(&self) -> Result<Vec<String>> {
        let positions = fetch_positions(&self.client, None).await?;
        let mut symbols: Vec<String> = positions
            .into_iter()
            .filter(Position::is_open)
            .map(|p| p.symbol)
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}
