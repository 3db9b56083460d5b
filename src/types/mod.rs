//! Core data model: snapshots, objectives, orders, AO records, token usage.

mod ao;
mod objective;
mod order;
mod snapshot;
mod telemetry;

pub use ao::*;
pub use objective::*;
pub use order::*;
pub use snapshot::*;
pub use telemetry::*;
