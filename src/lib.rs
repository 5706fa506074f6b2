//! # Tagbatch
//!
//! A batching and result-aggregation engine for image interrogation workloads.
//!
//! Tagbatch multiplexes many logical per-model queues through a single
//! background drain loop: callers submit named work items under a queue key,
//! each item is processed exactly once by an external interrogator, and the
//! per-item result bags accumulate under the queue key until an empty-name
//! "close the batch" submission pops them all at once.
//!
//! ## Core Behavior
//!
//! - **Per-model queues**: created lazily on first submission, retired once
//!   no batch under the model has outstanding work.
//! - **Lazy drain loop**: a single background task starts on demand, sweeps
//!   every model queue without blocking, and tears itself down when drained.
//! - **Dedup and naming**: duplicate names within a batch are suffixed
//!   (`img#0`, `img#1`, ...) instead of clobbered; the `<sha256>` sentinel
//!   derives the name from the payload so identical re-submissions are
//!   idempotent.
//! - **Isolated failures**: an interrogator failure resolves only that
//!   item's awaiting caller; sibling items and the loop are unaffected.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tagbatch::config::EngineConfig;
//! use tagbatch::core::{BatchEngine, SubmitOutcome};
//! use tagbatch::runtime::TokioSpawner;
//!
//! let engine = BatchEngine::new(
//!     EngineConfig::default(),
//!     my_interrogator, // implements Interrogator
//!     TokioSpawner::current(),
//! )?;
//!
//! // Add two items to a batch, then close it and collect everything.
//! engine.submit("wd14", "batch1", "img1", bytes_a, 0.35).await?;
//! engine.submit("wd14", "batch1", "img2", bytes_b, 0.35).await?;
//! let all = engine.submit("wd14", "batch1", "", Vec::new(), 0.0).await?;
//! assert!(matches!(all, SubmitOutcome::BatchClosed(_)));
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

/// Core batching engine, aggregation, and contracts.
pub mod core;
/// Configuration models for the engine.
pub mod config;
/// Infrastructure adapters for queue backends.
pub mod infra;
/// Runtime adapters and the request-layer API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
