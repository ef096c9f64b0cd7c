// Trading strategy module
pub mod auto_trade;
pub mod rsi_entry;

pub use auto_trade::{AutoTrader, EntryOutcome, ExitOutcome};
pub use rsi_entry::{evaluate_candles, EntrySignal, RsiEntryEvaluator};
