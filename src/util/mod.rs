//! Shared utilities.

pub mod naming;
pub mod telemetry;

pub use naming::*;
pub use telemetry::*;
