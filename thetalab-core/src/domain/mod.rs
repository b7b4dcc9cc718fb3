//! Domain types shared by every engine component.

pub mod bar;
pub mod contract;
pub mod fill;
pub mod ids;
pub mod order;
pub mod position;
pub mod quote;
pub mod trade;

pub use bar::Bar;
pub use contract::{grid_strike, OptionContract, Right};
pub use fill::Fill;
pub use ids::{IntentId, PositionId, RunId};
pub use order::{IntentIds, IntentKind, LegSpec, OrderIntent, OrderKind};
pub use position::{Leg, Position, PositionStatus};
pub use quote::{ChainSnapshot, OptionQuote};
pub use trade::{ExitReason, Trade, TradeLeg};
