// Price-structure checks on completed candles

use crate::models::Candle;

/// Lows of the two most recent candles, oldest first.
///
/// Returns `None` with fewer than two candles.
pub fn last_two_lows(candles: &[Candle]) -> Option<(f64, f64)> {
    match candles {
        [.., prev, latest] => Some((prev.low, latest.low)),
        _ => None,
    }
}

/// True when the latest candle's low is strictly above the one before it.
///
/// A higher low after an oversold reading is taken as a reversal hint,
/// not just a falling market.
pub fn is_higher_low(candles: &[Candle]) -> bool {
    last_two_lows(candles).is_some_and(|(prev, latest)| latest > prev)
}
