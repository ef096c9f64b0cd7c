use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// Position side an opening order creates in hedge mode (BUY opens LONG).
    pub fn opening_position_side(&self) -> PositionSide {
        match self {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side: {}", other)),
        }
    }
}

/// Position side as reported by the exchange. `Both` is one-way mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
            PositionSide::Both => "BOTH",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Net direction of an open position
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side that reduces a position in this direction.
    pub fn exit_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginType {
    Isolated,
    Crossed,
}

impl MarginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginType::Isolated => "ISOLATED",
            MarginType::Crossed => "CROSSED",
        }
    }
}

/// Live position as reported by the exchange. Never cached or mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    #[serde(default = "default_position_side")]
    pub position_side: PositionSide,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
}

fn default_position_side() -> PositionSide {
    PositionSide::Both
}

impl Position {
    pub fn is_open(&self) -> bool {
        !self.position_amt.is_zero()
    }

    /// Direction from the reported side, falling back to the amount's sign in one-way mode.
    pub fn direction(&self) -> Direction {
        match self.position_side {
            PositionSide::Long => Direction::Long,
            PositionSide::Short => Direction::Short,
            PositionSide::Both => {
                if self.position_amt.is_sign_negative() {
                    Direction::Short
                } else {
                    Direction::Long
                }
            }
        }
    }
}

/// Result of checking an open position against its profit target
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfitEvaluation {
    pub should_take_profit: bool,
    pub side: Direction,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub target_price: Decimal,
}

/// OHLC candle. The last candle of a fetch may still be in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

/// MARKET order ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    /// Plain decimal string at the symbol's quantity precision.
    pub quantity: String,
    pub position_side: Option<PositionSide>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, quantity: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            position_side: None,
        }
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = Some(position_side);
        self
    }

    /// Query parameters in submission order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", self.quantity.clone()),
        ];
        if let Some(position_side) = self.position_side {
            params.push(("positionSide", position_side.as_str().to_string()));
        }
        params
    }
}
