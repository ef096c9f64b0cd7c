use crate::api::types::OrderAck;
use crate::execution::{OrderExecutor, PositionStateEvaluator};
use crate::models::{OrderSide, ProfitEvaluation};
use crate::strategy::rsi_entry::RsiEntryEvaluator;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    PositionAlreadyOpen,
    ConditionNotMet,
    Opened(OrderAck),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    NoPosition,
    TargetNotReached(ProfitEvaluation),
    Closed {
        evaluation: ProfitEvaluation,
        orders: Vec<OrderAck>,
    },
}

/// Per-symbol entry and exit decisions, invoked by the scheduler.
///
/// Each call runs its exchange requests one after another. Nothing is
/// rolled back on failure: if cancelling orders succeeds and closing fails,
/// the cancellation stands and the error goes to the caller.
pub struct AutoTrader {
    positions: PositionStateEvaluator,
    entry: RsiEntryEvaluator,
    executor: OrderExecutor,
}

impl AutoTrader {
    pub fn new(
        positions: PositionStateEvaluator,
        entry: RsiEntryEvaluator,
        executor: OrderExecutor,
    ) -> Self {
        Self {
            positions,
            entry,
            executor,
        }
    }

    pub fn positions(&self) -> &PositionStateEvaluator {
        &self.positions
    }

    pub fn entry(&self) -> &RsiEntryEvaluator {
        &self.entry
    }

    pub fn executor(&self) -> &OrderExecutor {
        &self.executor
    }

    /// With no open position, open an auto-sized BUY when the RSI entry
    /// condition holds.
    pub async fn evaluate_entry(&self, symbol: &str) -> Result<EntryOutcome> {
        if self.positions.has_open_position(symbol).await? {
            tracing::debug!(symbol, "Position already open, skipping entry");
            return Ok(EntryOutcome::PositionAlreadyOpen);
        }

        if !self.entry.should_enter(symbol).await? {
            return Ok(EntryOutcome::ConditionNotMet);
        }

        let ack = self
            .executor
            .open_market_position(symbol, OrderSide::Buy, None)
            .await?;
        Ok(EntryOutcome::Opened(ack))
    }

    /// Take profit on an open position: cancel open orders, then close at
    /// market with the side opposite to the position.
    pub async fn evaluate_exit(&self, symbol: &str) -> Result<ExitOutcome> {
        if !self.positions.has_open_position(symbol).await? {
            return Ok(ExitOutcome::NoPosition);
        }

        let Some(evaluation) = self.positions.evaluate_profit_target(symbol).await? else {
            return Ok(ExitOutcome::NoPosition);
        };

        if !evaluation.should_take_profit {
            return Ok(ExitOutcome::TargetNotReached(evaluation));
        }

        self.executor.cancel_all_open_orders(symbol).await?;
        let orders = self
            .executor
            .close_position_market(symbol, Some(evaluation.side.exit_side()))
            .await?;

        Ok(ExitOutcome::Closed { evaluation, orders })
    }
}
