use std::sync::Arc;

use crate::api::types::RawKline;
use crate::api::{BinanceClient, QueryParams, KLINES_PATH};
use crate::error::BotError;
use crate::indicators::{calculate_rsi, last_two_lows};
use crate::models::Candle;
use crate::Result;

pub const ENTRY_INTERVAL: &str = "15m";
/// 15 completed candles plus the one still forming
pub const ENTRY_LOOKBACK: usize = 16;
pub const RSI_PERIOD: usize = 14;
pub const RSI_OVERSOLD: f64 = 30.0;

/// Inputs and outcome of one entry check
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub rsi: f64,
    pub prev_low: f64,
    pub latest_low: f64,
    pub should_enter: bool,
}

/// Entry rule on a kline fetch whose last candle is still in progress.
///
/// Drops the in-progress candle, computes RSI(14) over the completed closes
/// and requires RSI < 30 together with a higher low on the two most recent
/// completed candles. Returns `None` if there is not enough history.
pub fn evaluate_candles(candles: &[Candle]) -> Option<EntrySignal> {
    let (_, completed) = candles.split_last()?;
    if completed.len() < RSI_PERIOD + 1 {
        return None;
    }

    let closes: Vec<f64> = completed.iter().map(|c| c.close).collect();
    let rsi = calculate_rsi(&closes, RSI_PERIOD)?;
    let (prev_low, latest_low) = last_two_lows(completed)?;

    Some(EntrySignal {
        rsi,
        prev_low,
        latest_low,
        should_enter: rsi < RSI_OVERSOLD && latest_low > prev_low,
    })
}

/// Fetches recent candles and applies the RSI + higher-low entry rule.
pub struct RsiEntryEvaluator {
    client: Arc<BinanceClient>,
}

impl RsiEntryEvaluator {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self { client }
    }

    /// Latest `ENTRY_LOOKBACK` 15-minute candles, oldest first.
    pub async fn fetch_candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        let mut params = QueryParams::new();
        params
            .push("symbol", symbol)
            .push("interval", ENTRY_INTERVAL)
            .push("limit", ENTRY_LOOKBACK.to_string());

        let rows: Vec<RawKline> = self.client.get_public_json(KLINES_PATH, &params).await?;
        rows.into_iter()
            .map(|row| {
                Candle::try_from(row).map_err(|e| {
                    BotError::InvalidInput(format!("bad kline price for {}: {}", symbol, e))
                })
            })
            .collect()
    }

    pub async fn evaluate(&self, symbol: &str) -> Result<Option<EntrySignal>> {
        let candles = self.fetch_candles(symbol).await?;
        let signal = evaluate_candles(&candles);

        match &signal {
            Some(s) => tracing::info!(
                symbol,
                rsi = s.rsi,
                prev_low = s.prev_low,
                latest_low = s.latest_low,
                enter = s.should_enter,
                "RSI entry evaluated"
            ),
            None => tracing::warn!(
                symbol,
                candles = candles.len(),
                "Not enough candle history for RSI entry"
            ),
        }

        Ok(signal)
    }

    pub async fn should_enter(&self, symbol: &str) -> Result<bool> {
        Ok(self
            .evaluate(symbol)
            .await?
            .is_some_and(|s| s.should_enter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, low: f64) -> Candle {
        Candle {
            open_time: 0,
            open: close,
            high: close + 1.0,
            low,
            close,
            volume: 1.0,
            close_time: 0,
        }
    }

    /// Closes giving RSI = 25 over the completed window, plus one live candle.
    fn oversold_candles(prev_low: f64, latest_low: f64) -> Vec<Candle> {
        let closes = [
            100.0, 99.0, 98.0, 97.0, 96.0, 95.0, 94.0, 93.0, 92.0, 91.0, 92.0, 93.0, 94.0, 94.0,
            94.0,
        ];
        let mut candles: Vec<Candle> = closes.iter().map(|c| candle(*c, c - 1.0)).collect();
        candles[13].low = prev_low;
        candles[14].low = latest_low;
        candles.push(candle(10.0, 1.0));
        candles
    }

    #[test]
    fn test_enter_on_oversold_higher_low() {
        let signal = evaluate_candles(&oversold_candles(93.0, 93.5)).unwrap();
        assert!((signal.rsi - 25.0).abs() < 1e-9);
        assert!(signal.should_enter);
    }

    #[test]
    fn test_no_entry_on_lower_low() {
        let signal = evaluate_candles(&oversold_candles(93.0, 92.5)).unwrap();
        assert!(!signal.should_enter);
    }

    #[test]
    fn test_in_progress_candle_ignored() {
        // the live candle's huge low must not count as the latest low
        let mut candles = oversold_candles(93.0, 92.5);
        candles.last_mut().unwrap().low = 1000.0;
        assert!(!evaluate_candles(&candles).unwrap().should_enter);
    }

    #[test]
    fn test_no_entry_when_not_oversold() {
        let mut candles: Vec<Candle> = (0..15).map(|i| candle(100.0 + i as f64, 99.0 + i as f64)).collect();
        candles.push(candle(120.0, 119.0));
        let signal = evaluate_candles(&candles).unwrap();
        assert_eq!(signal.rsi, 100.0);
        assert!(!signal.should_enter);
    }

    #[test]
    fn test_insufficient_history() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i as f64, 0.0)).collect();
        assert!(evaluate_candles(&candles).is_none());
        assert!(evaluate_candles(&[]).is_none());
    }
}
