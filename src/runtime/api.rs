//! API-facing request/response models for the hosting request layer.
//!
//! The HTTP framework itself is out of scope; these models plus
//! `submit_request` are the seam a request handler maps onto.

use serde::{Deserialize, Serialize};

use crate::core::{BatchEngine, EngineError, Interrogator, Spawn, SubmitOutcome};

/// Submission payload mapped from the hosting request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterrogateRequest {
    /// Model identifier selecting the worker configuration and queue.
    pub model: String,
    /// Queue key identifying the logical batch.
    pub queue: String,
    /// Item name within the batch; empty closes the batch, `<sha256>`
    /// derives the name from the payload's content hash.
    #[serde(default)]
    pub name: String,
    /// Raw image payload.
    #[serde(default)]
    pub image: Vec<u8>,
    /// Score threshold passed through to the interrogator.
    #[serde(default)]
    pub threshold: f32,
}

/// Response wrapping a submission's resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterrogateResponse {
    /// Resolution of the submission.
    pub outcome: SubmitOutcome,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Submit a request to the engine and wrap the outcome.
///
/// # Errors
///
/// Propagates the engine's per-item error for this submission only.
pub async fn submit_request<I, S>(
    engine: &BatchEngine<I, S>,
    req: InterrogateRequest,
) -> Result<InterrogateResponse, EngineError>
where
    I: Interrogator,
    S: Spawn + Clone + Send + Sync + 'static,
{
    let outcome = engine
        .submit(&req.model, &req.queue, &req.name, req.image, req.threshold)
        .await?;
    Ok(InterrogateResponse { outcome })
}

/// Return a health payload.
pub fn health() -> Health {
    Health { ok: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: InterrogateRequest =
            serde_json::from_str(r#"{"model": "wd14", "queue": "b"}"#).unwrap();
        assert_eq!(req.model, "wd14");
        assert_eq!(req.queue, "b");
        assert_eq!(req.name, "");
        assert!(req.image.is_empty());
        assert_eq!(req.threshold, 0.0);
    }

    #[test]
    fn test_health() {
        assert!(health().ok);
    }
}
