use crate::error::BotError;
use crate::Result;

/// RSI value used when average loss over the window is zero.
pub const RSI_NO_LOSS: f64 = 100.0;

/// Strict one-shot RSI over the first `period` price changes.
///
/// Gains and losses are summed over indices `1..=period` and divided by
/// `period`. There is no exponential smoothing and no memory between calls.
/// A zero change counts as a zero gain.
///
/// Fails with `MathematicalDegeneracy` when the average loss is zero, since
/// RS is undefined there. Use [`calculate_rsi`] for the policy-applied value.
pub fn try_calculate_rsi(prices: &[f64], period: usize) -> Result<f64> {
    if period == 0 || prices.len() < period + 1 {
        return Err(BotError::InvalidInput(format!(
            "RSI({}) needs {} prices, got {}",
            period,
            period + 1,
            prices.len()
        )));
    }

    let mut gain = 0.0;
    let mut loss = 0.0;
    for i in 1..=period {
        let change = prices[i] - prices[i - 1];
        if change >= 0.0 {
            gain += change;
        } else {
            loss -= change;
        }
    }

    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;

    if avg_loss == 0.0 {
        return Err(BotError::MathematicalDegeneracy { period });
    }

    let rs = avg_gain / avg_loss;
    Ok(100.0 - (100.0 / (1.0 + rs)))
}

/// Calculate Relative Strength Index (RSI)
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Returns `None` with fewer than `period + 1` prices. A window with no
/// losses (including a completely flat one) evaluates to [`RSI_NO_LOSS`].
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    match try_calculate_rsi(prices, period) {
        Ok(rsi) => Some(rsi),
        Err(BotError::MathematicalDegeneracy { .. }) => Some(RSI_NO_LOSS),
        Err(_) => None,
    }
}
