pub mod binance;
pub mod signing;
pub mod types;

pub use binance::BinanceClient;
pub use signing::{sign, QueryParams};
pub use types::{DualSidePosition, ExchangeInfo, OrderAck, PremiumIndex, RawKline, ServerTime};

// Futures REST paths
pub const POSITION_RISK_PATH: &str = "/fapi/v3/positionRisk";
pub const PREMIUM_INDEX_PATH: &str = "/fapi/v1/premiumIndex";
pub const DUAL_SIDE_PATH: &str = "/fapi/v1/positionSide/dual";
pub const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";
pub const KLINES_PATH: &str = "/fapi/v1/klines";
pub const LEVERAGE_PATH: &str = "/fapi/v1/leverage";
pub const MARGIN_TYPE_PATH: &str = "/fapi/v1/marginType";
pub const ORDER_PATH: &str = "/fapi/v1/order";
pub const ALL_OPEN_ORDERS_PATH: &str = "/fapi/v1/allOpenOrders";
