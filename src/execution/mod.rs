// Position state and order execution module
pub mod order_executor;
pub mod position_state;

pub use order_executor::{
    closing_orders, compute_auto_quantity, normalize_quantity, OrderExecutor, OrderSettings,
};
pub use position_state::{fetch_positions, PositionStateEvaluator, ProfitTarget};
