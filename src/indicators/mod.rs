// Technical indicators module
// Implements RSI and candle-structure checks for entry evaluation

pub mod rsi;
pub mod structure;

pub use rsi::{calculate_rsi, try_calculate_rsi, RSI_NO_LOSS};
pub use structure::{is_higher_low, last_two_lows};
