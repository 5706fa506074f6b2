//! Runtime adapters and the request-layer API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{health, submit_request, InterrogateRequest, InterrogateResponse};
pub use tokio_spawner::TokioSpawner;
