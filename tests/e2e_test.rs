use async_trait::async_trait;
use futuresbot::config::{BinanceSettings, TradingSettings};
use futuresbot::notify::Notifier;
use futuresbot::*;
use mockito::{Matcher, Mock, ServerGuard};
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(BotError::Notification("telegram unreachable".to_string()));
        }
        Ok(())
    }
}

fn settings(base_url: String) -> Settings {
    Settings {
        binance: BinanceSettings {
            base_url,
            api_key: "test-key".to_string(),
            secret: "test-secret".to_string(),
            margin_type: MarginType::Isolated,
            default_leverage: 5,
            commission_rate: dec!(0.001),
            target_profit_percent: dec!(0.004),
            recv_window: 5000,
            requests_per_minute: 6000,
            request_timeout_secs: 5,
        },
        telegram: None,
        trading: TradingSettings::default(),
    }
}

fn metadata() -> SymbolMetadataCache {
    SymbolMetadataCache::from_filters(vec![
        SymbolFilter {
            symbol: "BTCUSDT".to_string(),
            min_notional: dec!(100),
            quantity_precision: 3,
        },
        SymbolFilter {
            symbol: "ETHUSDT".to_string(),
            min_notional: dec!(20),
            quantity_precision: 3,
        },
    ])
}

fn trader(server: &ServerGuard, notifier: Arc<RecordingNotifier>) -> AutoTrader {
    let settings = settings(server.url());
    let client = Arc::new(BinanceClient::new(&settings.binance).unwrap());
    assemble(client, Arc::new(metadata()), &settings, notifier)
}

async fn mock_time(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/fapi/v1/time")
        .with_status(200)
        .with_body(format!(
            r#"{{"serverTime":{}}}"#,
            chrono::Utc::now().timestamp_millis()
        ))
        .create_async()
        .await
}

async fn mock_positions(server: &mut ServerGuard, body: &str) -> Mock {
    server
        .mock("GET", "/fapi/v3/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await
}

async fn mock_ok(server: &mut ServerGuard, method: &str, path: &str, body: &str) -> Mock {
    server
        .mock(method, path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await
}

/// 16 klines: 15 completed with RSI(14) = 25 and the given last two lows,
/// then one in-progress candle.
fn klines_body(prev_low: f64, latest_low: f64) -> String {
    let closes = [
        100.0, 99.0, 98.0, 97.0, 96.0, 95.0, 94.0, 93.0, 92.0, 91.0, 92.0, 93.0, 94.0, 94.0, 94.0,
        94.2,
    ];
    let rows: Vec<String> = closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let low = match i {
                13 => prev_low,
                14 => latest_low,
                _ => close - 1.0,
            };
            let open_time = 1_700_000_000_000i64 + i as i64 * 900_000;
            format!(
                r#"[{},"{}","{}","{}","{}","10.0",{},"1000.0",42,"5.0","500.0","0"]"#,
                open_time,
                close,
                close + 1.0,
                low,
                close,
                open_time + 899_999
            )
        })
        .collect();
    format!("[{}]", rows.join(","))
}

async fn mock_klines(server: &mut ServerGuard, prev_low: f64, latest_low: f64) -> Mock {
    server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("interval".into(), "15m".into()),
            Matcher::UrlEncoded("limit".into(), "16".into()),
        ]))
        .with_status(200)
        .with_body(klines_body(prev_low, latest_low))
        .create_async()
        .await
}

const NO_POSITIONS: &str = r#"[]"#;

// ============================================================================
// Entry
// ============================================================================

#[tokio::test]
async fn test_entry_opens_single_buy_with_auto_quantity() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(
        &mut server,
        r#"[{"symbol":"BTCUSDT","positionSide":"BOTH","positionAmt":"0.000","entryPrice":"0.0","markPrice":"67000.0"}]"#,
    )
    .await;
    mock_klines(&mut server, 93.0, 93.5).await;
    let margin = mock_ok(&mut server, "POST", "/fapi/v1/marginType", r#"{"code":200,"msg":"success"}"#).await;
    let leverage = mock_ok(&mut server, "POST", "/fapi/v1/leverage", r#"{"symbol":"BTCUSDT","leverage":5}"#).await;
    mock_ok(&mut server, "GET", "/fapi/v1/premiumIndex", r#"{"symbol":"BTCUSDT","markPrice":"67000.00"}"#).await;
    mock_ok(&mut server, "GET", "/fapi/v1/positionSide/dual", r#"{"dualSidePosition":false}"#).await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("side".into(), "BUY".into()),
            Matcher::UrlEncoded("type".into(), "MARKET".into()),
            // 100 * 1.05 / 67000 = 0.001567 -> rounded up to 0.002
            Matcher::UrlEncoded("quantity".into(), "0.002".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":1001,"symbol":"BTCUSDT","status":"NEW"}"#)
        .expect(1)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let trader = trader(&server, notifier.clone());

    let outcome = trader.evaluate_entry("BTCUSDT").await.unwrap();

    match outcome {
        EntryOutcome::Opened(ack) => assert_eq!(ack.order_id, 1001),
        other => panic!("expected an order, got {:?}", other),
    }
    order.assert_async().await;
    margin.assert_async().await;
    leverage.assert_async().await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("BTCUSDT"));
}

#[tokio::test]
async fn test_entry_skipped_when_position_open() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(
        &mut server,
        r#"[{"symbol":"BTCUSDT","positionSide":"LONG","positionAmt":"0.002","entryPrice":"66000.0","markPrice":"67000.0"}]"#,
    )
    .await;
    let klines = server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let outcome = trader(&server, notifier.clone())
        .evaluate_entry("BTCUSDT")
        .await
        .unwrap();

    assert_eq!(outcome, EntryOutcome::PositionAlreadyOpen);
    klines.assert_async().await;
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_entry_condition_not_met_on_lower_low() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(&mut server, NO_POSITIONS).await;
    mock_klines(&mut server, 93.0, 92.0).await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let outcome = trader(&server, notifier.clone())
        .evaluate_entry("BTCUSDT")
        .await
        .unwrap();

    assert_eq!(outcome, EntryOutcome::ConditionNotMet);
    order.assert_async().await;
}

// ============================================================================
// Opening orders
// ============================================================================

#[tokio::test]
async fn test_hedge_mode_buy_tagged_long() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    // margin type already set on the account
    server
        .mock("POST", "/fapi/v1/marginType")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-4046,"msg":"No need to change margin type."}"#)
        .create_async()
        .await;
    mock_ok(&mut server, "POST", "/fapi/v1/leverage", r#"{"leverage":5}"#).await;
    mock_ok(&mut server, "GET", "/fapi/v1/positionSide/dual", r#"{"dualSidePosition":true}"#).await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("side".into(), "BUY".into()),
            // padded to ETHUSDT's 3 decimal places
            Matcher::UrlEncoded("quantity".into(), "0.500".into()),
            Matcher::UrlEncoded("positionSide".into(), "LONG".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":7,"symbol":"ETHUSDT","status":"NEW"}"#)
        .expect(1)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let ack = trader(&server, notifier)
        .executor()
        .open_market_position("ETHUSDT", OrderSide::Buy, Some("0.5"))
        .await
        .unwrap();

    assert_eq!(ack.order_id, 7);
    order.assert_async().await;
}

#[tokio::test]
async fn test_too_precise_quantity_rejected_before_setup() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    let margin = server
        .mock("POST", "/fapi/v1/marginType")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let err = trader(&server, notifier.clone())
        .executor()
        .open_market_position("ETHUSDT", OrderSide::Buy, Some("0.12345678"))
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::InvalidInput(_)));
    margin.assert_async().await;
    order.assert_async().await;
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_margin_type_rejection_stops_open() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    server
        .mock("POST", "/fapi/v1/marginType")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-4047,"msg":"Margin type cannot be changed if there exists open orders."}"#)
        .create_async()
        .await;
    let leverage = server
        .mock("POST", "/fapi/v1/leverage")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let err = trader(&server, notifier.clone())
        .executor()
        .open_market_position("ETHUSDT", OrderSide::Buy, Some("0.010"))
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::ExchangeApi { status_code: 400, .. }));
    assert_eq!(err.exchange_code(), Some(-4047));
    leverage.assert_async().await;
    order.assert_async().await;
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_missing_metadata_fails_after_setup() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    let margin = mock_ok(&mut server, "POST", "/fapi/v1/marginType", "{}").await;
    let leverage = mock_ok(&mut server, "POST", "/fapi/v1/leverage", "{}").await;
    mock_ok(&mut server, "GET", "/fapi/v1/premiumIndex", r#"{"symbol":"DOGEUSDT","markPrice":"0.15"}"#).await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let err = trader(&server, notifier.clone())
        .executor()
        .open_market_position("DOGEUSDT", OrderSide::Buy, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::MissingMetadata(ref s) if s == "DOGEUSDT"));
    // setup already applied stays applied
    margin.assert_async().await;
    leverage.assert_async().await;
    order.assert_async().await;
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_order() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_ok(&mut server, "POST", "/fapi/v1/marginType", "{}").await;
    mock_ok(&mut server, "POST", "/fapi/v1/leverage", "{}").await;
    mock_ok(&mut server, "GET", "/fapi/v1/positionSide/dual", r#"{"dualSidePosition":false}"#).await;
    mock_ok(&mut server, "POST", "/fapi/v1/order", r#"{"orderId":9,"symbol":"ETHUSDT","status":"NEW"}"#).await;

    let notifier = Arc::new(RecordingNotifier::failing());
    let ack = trader(&server, notifier.clone())
        .executor()
        .open_market_position("ETHUSDT", OrderSide::Sell, Some("0.010"))
        .await
        .unwrap();

    assert_eq!(ack.order_id, 9);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_order_rejection_surfaces_exchange_error() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_ok(&mut server, "POST", "/fapi/v1/marginType", "{}").await;
    mock_ok(&mut server, "POST", "/fapi/v1/leverage", "{}").await;
    mock_ok(&mut server, "GET", "/fapi/v1/positionSide/dual", r#"{"dualSidePosition":false}"#).await;
    server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-4164,"msg":"Order's notional must be no smaller than 20"}"#)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let err = trader(&server, notifier.clone())
        .executor()
        .open_market_position("ETHUSDT", OrderSide::Buy, Some("0.001"))
        .await
        .unwrap_err();

    assert_eq!(err.exchange_code(), Some(-4164));
    assert!(notifier.messages().is_empty());
}

// ============================================================================
// Exit
// ============================================================================

const ETH_LONG_2010: &str = r#"[
    {"symbol":"ETHUSDT","positionSide":"LONG","positionAmt":"0.500","entryPrice":"2000.0","markPrice":"2010.0"},
    {"symbol":"ETHUSDT","positionSide":"SHORT","positionAmt":"0.000","entryPrice":"0.0","markPrice":"2010.0"}
]"#;

const ETH_LONG_2015: &str = r#"[
    {"symbol":"ETHUSDT","positionSide":"LONG","positionAmt":"0.500","entryPrice":"2000.0","markPrice":"2015.0"},
    {"symbol":"ETHUSDT","positionSide":"SHORT","positionAmt":"0.000","entryPrice":"0.0","markPrice":"2015.0"}
]"#;

#[tokio::test]
async fn test_exit_below_target_submits_nothing() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(&mut server, ETH_LONG_2010).await;
    let cancel = server
        .mock("DELETE", "/fapi/v1/allOpenOrders")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let outcome = trader(&server, notifier.clone())
        .evaluate_exit("ETHUSDT")
        .await
        .unwrap();

    // buffer = 4, long target = 2000 * 1.004 + 4 = 2012 > 2010
    match outcome {
        ExitOutcome::TargetNotReached(eval) => {
            assert!(!eval.should_take_profit);
            assert_eq!(eval.target_price, dec!(2012));
            assert_eq!(eval.side, Direction::Long);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    cancel.assert_async().await;
    order.assert_async().await;
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_exit_closes_long_with_sell_tagged_long() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(&mut server, ETH_LONG_2015).await;
    let cancel = server
        .mock("DELETE", "/fapi/v1/allOpenOrders")
        .match_query(Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()))
        .with_status(200)
        .with_body(r#"{"code":200,"msg":"The operation of cancel all open order is done."}"#)
        .expect(1)
        .create_async()
        .await;
    let order = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("side".into(), "SELL".into()),
            Matcher::UrlEncoded("positionSide".into(), "LONG".into()),
            Matcher::UrlEncoded("quantity".into(), "0.500".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":55,"symbol":"ETHUSDT","status":"FILLED"}"#)
        .expect(1)
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let outcome = trader(&server, notifier.clone())
        .evaluate_exit("ETHUSDT")
        .await
        .unwrap();

    match outcome {
        ExitOutcome::Closed { evaluation, orders } => {
            assert!(evaluation.should_take_profit);
            assert_eq!(orders.len(), 1);
            assert_eq!(orders[0].order_id, 55);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    cancel.assert_async().await;
    order.assert_async().await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("ETHUSDT"));
}

#[tokio::test]
async fn test_exit_close_failure_keeps_cancellation() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(&mut server, ETH_LONG_2015).await;
    let cancel = mock_ok(&mut server, "DELETE", "/fapi/v1/allOpenOrders", r#"{"code":200}"#).await;
    server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let err = trader(&server, notifier)
        .evaluate_exit("ETHUSDT")
        .await
        .unwrap_err();

    assert!(matches!(err, BotError::ExchangeApi { status_code: 503, .. }));
    cancel.assert_async().await;
}

#[tokio::test]
async fn test_exit_without_position() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(&mut server, NO_POSITIONS).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let outcome = trader(&server, notifier)
        .evaluate_exit("SOLUSDT")
        .await
        .unwrap();
    assert_eq!(outcome, ExitOutcome::NoPosition);
}

#[tokio::test]
async fn test_open_position_symbols_deduplicated() {
    let mut server = mockito::Server::new_async().await;
    mock_time(&mut server).await;
    mock_positions(
        &mut server,
        r#"[
            {"symbol":"XRPUSDT","positionSide":"LONG","positionAmt":"10","entryPrice":"0.5","markPrice":"0.51"},
            {"symbol":"XRPUSDT","positionSide":"SHORT","positionAmt":"-5","entryPrice":"0.52","markPrice":"0.51"},
            {"symbol":"ADAUSDT","positionSide":"BOTH","positionAmt":"0","entryPrice":"0","markPrice":"0.3"},
            {"symbol":"BNBUSDT","positionSide":"BOTH","positionAmt":"-0.1","entryPrice":"600","markPrice":"590"}
        ]"#,
    )
    .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let symbols = trader(&server, notifier)
        .positions()
        .open_position_symbols()
        .await
        .unwrap();
    assert_eq!(symbols, vec!["BNBUSDT".to_string(), "XRPUSDT".to_string()]);
}
