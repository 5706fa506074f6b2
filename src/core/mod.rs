//! Core batching abstractions: engine, aggregation, and contracts.

pub mod aggregator;
pub mod engine;
pub mod error;
pub mod interrogator;

pub use aggregator::{BatchResults, ResultAggregator};
pub use engine::{BatchEngine, RunningSnapshot, Spawn, SubmitOutcome, WorkItem};
pub use error::{AppResult, EngineError};
pub use interrogator::{InterrogationOutput, Interrogator, ResultBag};
