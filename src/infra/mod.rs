//! Infrastructure adapters for queue backends.

pub mod queue;

pub use queue::InMemoryWorkQueue;
