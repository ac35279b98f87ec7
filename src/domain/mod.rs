//! Data model (§3). Append-only DAG: Snapshot → Analysis → Signal.

pub mod analysis;
pub mod candle;
pub mod event;
pub mod price_update;
pub mod registry;
pub mod signal;
pub mod snapshot;

pub use analysis::*;
pub use candle::*;
pub use event::*;
pub use price_update::*;
pub use registry::*;
pub use signal::*;
pub use snapshot::*;
