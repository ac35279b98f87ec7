//! Technical Theory Library (§4.D). Pure functions, no I/O.

pub mod dow;
pub mod gann;
pub mod indicators;
pub mod wyckoff;

pub use dow::dow_structure;
pub use gann::gann_angle;
pub use indicators::{bollinger, ema, macd, rsi};
pub use wyckoff::wyckoff_phase;
