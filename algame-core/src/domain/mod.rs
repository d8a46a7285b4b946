//! Domain types: bars, orders, fills, trades, signals, parameters.

pub mod bar;
pub mod fill;
pub mod order;
pub mod params;
pub mod signal;
pub mod trade;

pub use bar::{validate_series, Bar, BarError};
pub use fill::Fill;
pub use order::{Order, OrderError, OrderId, OrderSide, OrderStatus};
pub use params::{ParamSet, ParamValue};
pub use signal::{Signal, SignalAction};
pub use trade::{ExitReason, Trade};
