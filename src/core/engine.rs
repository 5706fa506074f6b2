//! Batching engine: per-model queue registry, drain loop, and submission API.
//!
//! Work items are enqueued per model identifier and consumed exactly once by
//! a single background drain loop. The loop sweeps every registered model,
//! pops whatever has accumulated without blocking, and dispatches each item
//! as its own task: named items run the interrogator and store their bag in
//! the aggregator, empty-name items close the batch and pop its results.
//! The loop starts lazily on the first submission and tears itself down once
//! every queue has drained.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::infra::queue::InMemoryWorkQueue;
use crate::util::naming::{sha256_name, SHA256_SENTINEL};

use super::aggregator::{BatchResults, ResultAggregator};
use super::error::EngineError;
use super::interrogator::Interrogator;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Snapshot of outstanding batch counters, keyed by model then queue key.
pub type RunningSnapshot = HashMap<String, HashMap<String, f64>>;

/// Resolution of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmitOutcome {
    /// Running-batches snapshot, returned for named items and for idempotent
    /// short-circuits of an already-queued content hash.
    Accepted(RunningSnapshot),
    /// Aggregated results popped when the batch was closed.
    BatchClosed(BatchResults),
}

/// One unit of work flowing from submission to the drain loop.
pub struct WorkItem {
    /// Queue key identifying the logical batch.
    pub queue_key: String,
    /// Resolved item name; empty means "close out the batch".
    pub name: String,
    /// Opaque image payload handed to the interrogator unmodified.
    pub image: Vec<u8>,
    /// Score threshold handed to the interrogator unmodified.
    pub threshold: f32,
    /// Channel resolving the submitting caller's await.
    reply: oneshot::Sender<Result<SubmitOutcome, EngineError>>,
}

/// State shared between the submission API, the drain loop, and item tasks.
///
/// One mutex per structure, never held across an await point.
struct EngineShared<I> {
    config: EngineConfig,
    interrogator: I,
    /// Per-model pending queues; an entry exists only while the model has
    /// work outstanding.
    queues: Mutex<HashMap<String, InMemoryWorkQueue<WorkItem>>>,
    aggregator: Mutex<ResultAggregator>,
    /// Outstanding item counts per (model, queue key). Incremented at
    /// dispatch, removed only by an explicit close-out.
    running: Mutex<RunningSnapshot>,
    /// Dispatched-but-unfinished named items per queue key; close-out waits
    /// for this to reach zero before popping.
    inflight: Mutex<HashMap<String, usize>>,
    /// Whether a drain loop is currently running.
    runner_active: AtomicBool,
}

impl<I> EngineShared<I> {
    fn running_snapshot(&self) -> RunningSnapshot {
        self.running.lock().clone()
    }
}

/// The batching engine.
///
/// Generic over the interrogator `I` and the runtime spawner `S` so tests can
/// substitute both. All methods take `&self`; the engine is cheap to clone
/// and clones share all state.
pub struct BatchEngine<I, S> {
    shared: Arc<EngineShared<I>>,
    spawner: S,
}

impl<I, S: Clone> Clone for BatchEngine<I, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            spawner: self.spawner.clone(),
        }
    }
}

impl<I, S> BatchEngine<I, S>
where
    I: Interrogator,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a new engine from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Backend` if the configuration is invalid.
    pub fn new(config: EngineConfig, interrogator: I, spawner: S) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::Backend(format!("config invalid: {e}")))?;
        info!(
            idle_delay_ms = config.idle_delay_ms,
            "batch engine initialized"
        );
        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                interrogator,
                queues: Mutex::new(HashMap::new()),
                aggregator: Mutex::new(ResultAggregator::new()),
                running: Mutex::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
                runner_active: AtomicBool::new(false),
            }),
            spawner,
        })
    }

    /// Submit one work item and await its resolution.
    ///
    /// - An empty `name` closes the batch: the awaited outcome is the popped
    ///   aggregated results for `queue_key`, or the running snapshot when the
    ///   key has none recorded.
    /// - The name `<sha256>` derives the item name from the payload's content
    ///   hash; re-submitting identical bytes short-circuits idempotently.
    /// - Any other name is deduplicated against the batch (`name#0`, ...) and
    ///   the awaited outcome is the running-batches snapshot taken when the
    ///   item's result landed.
    ///
    /// Starts the drain loop if it is not running.
    ///
    /// # Errors
    ///
    /// Interrogator failures for this item propagate here and only here;
    /// sibling items in the same or other batches are unaffected.
    pub async fn submit(
        &self,
        model: &str,
        queue_key: &str,
        name: &str,
        image: Vec<u8>,
        threshold: f32,
    ) -> Result<SubmitOutcome, EngineError> {
        let resolved = if name.is_empty() {
            String::new()
        } else {
            match self.resolve_and_register(queue_key, name, &image) {
                Some(resolved) => resolved,
                None => {
                    debug!(queue_key, "identical payload already recorded, short-circuiting");
                    return Ok(SubmitOutcome::Accepted(self.shared.running_snapshot()));
                }
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let item = WorkItem {
            queue_key: queue_key.to_string(),
            name: resolved,
            image,
            threshold,
            reply: reply_tx,
        };
        {
            let mut queues = self.shared.queues.lock();
            queues.entry(model.to_string()).or_default().enqueue(item);
        }
        debug!(model, queue_key, "work item enqueued");

        self.ensure_runner();
        reply_rx.await.map_err(|_| EngineError::Shutdown)?
    }

    /// Snapshot of outstanding batch counters per model and queue key.
    pub fn running_batches(&self) -> RunningSnapshot {
        self.shared.running_snapshot()
    }

    /// Models currently holding a registered queue.
    pub fn registered_models(&self) -> Vec<String> {
        self.shared.queues.lock().keys().cloned().collect()
    }

    /// Whether the drain loop is currently running.
    pub fn is_draining(&self) -> bool {
        self.shared.runner_active.load(Ordering::Acquire)
    }

    /// Resolve the item name against the batch and pre-register an empty bag.
    ///
    /// Returns `None` when a content-hash name is already recorded, which
    /// signals the idempotent short-circuit.
    fn resolve_and_register(&self, queue_key: &str, name: &str, image: &[u8]) -> Option<String> {
        let mut aggregator = self.shared.aggregator.lock();
        let resolved = if name == SHA256_SENTINEL {
            let derived = sha256_name(image);
            if aggregator.contains(queue_key, &derived) {
                return None;
            }
            derived
        } else {
            aggregator.resolve_name(queue_key, name)
        };
        aggregator.register(queue_key, &resolved);
        Some(resolved)
    }

    /// Start the drain loop if no runner holds the slot.
    fn ensure_runner(&self) {
        if self
            .shared
            .runner_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("starting drain loop");
            let shared = Arc::clone(&self.shared);
            let spawner = self.spawner.clone();
            self.spawner.spawn(drain_loop(shared, spawner));
        }
    }
}

/// Drain until the registry empties, then release the runner slot.
///
/// An enqueue can race the teardown: it observes `runner_active == true`
/// while this loop is past its final emptiness check. The re-check after
/// clearing the flag reclaims the slot in that window instead of stranding
/// the item.
async fn drain_loop<I, S>(shared: Arc<EngineShared<I>>, spawner: S)
where
    I: Interrogator,
    S: Spawn + Clone + Send + Sync + 'static,
{
    loop {
        sweep_until_empty(&shared, &spawner).await;

        shared.running.lock().clear();
        shared.runner_active.store(false, Ordering::Release);

        if shared.queues.lock().is_empty() {
            info!("drain loop stopped");
            break;
        }
        if shared
            .runner_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another submission already restarted the loop.
            break;
        }
        debug!("drain loop reclaimed after racing enqueue");
    }
}

/// Repeatedly sweep all model queues until the registry is empty.
async fn sweep_until_empty<I, S>(shared: &Arc<EngineShared<I>>, spawner: &S)
where
    I: Interrogator,
    S: Spawn + Clone + Send + Sync + 'static,
{
    loop {
        let models: Vec<String> = shared.queues.lock().keys().cloned().collect();
        if models.is_empty() {
            return;
        }

        for model in models {
            // Non-blocking drain of whatever accumulated since the last
            // pass; arrivals during the pass are picked up on the next one.
            loop {
                let item = {
                    let mut queues = shared.queues.lock();
                    queues
                        .get_mut(&model)
                        .and_then(InMemoryWorkQueue::try_dequeue)
                };
                let Some(item) = item else { break };
                dispatch(shared, spawner, &model, item);
            }
        }

        // Retire models with no outstanding batches. A non-empty queue is
        // never retired: an item enqueued mid-pass must survive to the next.
        {
            let running = shared.running.lock();
            let mut queues = shared.queues.lock();
            queues.retain(|model, queue| {
                let outstanding = running
                    .get(model)
                    .is_some_and(|batches| !batches.is_empty());
                if !outstanding && queue.is_empty() {
                    debug!(model = %model, "retiring idle model queue");
                }
                outstanding || !queue.is_empty()
            });
            if queues.is_empty() {
                return;
            }
        }

        tokio::time::sleep(shared.config.idle_delay()).await;
    }
}

/// Dispatch one popped item as its own task.
fn dispatch<I, S>(shared: &Arc<EngineShared<I>>, spawner: &S, model: &str, item: WorkItem)
where
    I: Interrogator,
    S: Spawn + Clone + Send + Sync + 'static,
{
    if item.name.is_empty() {
        debug!(model, queue_key = %item.queue_key, "dispatching close-out");
        spawner.spawn(close_queue(Arc::clone(shared), model.to_string(), item));
    } else {
        // Count at dispatch, not at completion, so close-out and retirement
        // observe this item even before the interrogator runs.
        {
            let mut running = shared.running.lock();
            *running
                .entry(model.to_string())
                .or_default()
                .entry(item.queue_key.clone())
                .or_insert(0.0) += 1.0;
        }
        {
            let mut inflight = shared.inflight.lock();
            *inflight.entry(item.queue_key.clone()).or_insert(0) += 1;
        }
        debug!(model, queue_key = %item.queue_key, name = %item.name, "dispatching interrogation");
        spawner.spawn(process_item(Arc::clone(shared), model.to_string(), item));
    }
}

/// Run the interrogator for one named item and store its bag.
async fn process_item<I: Interrogator>(shared: Arc<EngineShared<I>>, model: String, item: WorkItem) {
    let WorkItem {
        queue_key,
        name,
        image,
        threshold,
        reply,
    } = item;

    let result = shared
        .interrogator
        .interrogate(&model, &image, threshold)
        .await;

    let outcome = match result {
        Ok(output) => {
            let bag = output.into_bag(&shared.config.rating_prefix);
            shared.aggregator.lock().insert(&queue_key, &name, bag);
            Ok(SubmitOutcome::Accepted(shared.running_snapshot()))
        }
        Err(e) => {
            // Isolated to this item's caller; the pre-registered empty bag
            // keeps the name visible in the batch.
            warn!(model = %model, queue_key = %queue_key, name = %name, error = %e, "interrogation failed");
            Err(e)
        }
    };

    finish_inflight(&shared, &queue_key);
    if reply.send(outcome).is_err() {
        debug!(queue_key = %queue_key, name = %name, "caller stopped awaiting; result kept in aggregator");
    }
}

/// Close out a batch: wait for in-flight siblings, drop its counter, pop.
async fn close_queue<I: Interrogator>(shared: Arc<EngineShared<I>>, model: String, item: WorkItem) {
    let WorkItem {
        queue_key, reply, ..
    } = item;

    // Results still in flight for this batch must land before the pop, or
    // they would be written into a mapping that no longer exists.
    loop {
        let pending = shared
            .inflight
            .lock()
            .get(&queue_key)
            .copied()
            .unwrap_or(0);
        if pending == 0 {
            break;
        }
        tokio::time::sleep(shared.config.idle_delay()).await;
    }

    if let Some(batches) = shared.running.lock().get_mut(&model) {
        batches.remove(&queue_key);
    }

    let popped = shared.aggregator.lock().pop_all(&queue_key);
    let outcome = match popped {
        Some(results) => {
            info!(model = %model, queue_key = %queue_key, items = results.len(), "batch closed");
            SubmitOutcome::BatchClosed(results)
        }
        None => {
            // Not an error: the batch may have been drained entirely by
            // individual awaits already.
            debug!(model = %model, queue_key = %queue_key, "close-out for unknown batch, returning snapshot");
            SubmitOutcome::Accepted(shared.running_snapshot())
        }
    };

    let _ = reply.send(Ok(outcome));
}

/// Mark one dispatched named item as landed.
fn finish_inflight<I>(shared: &EngineShared<I>, queue_key: &str) {
    let mut inflight = shared.inflight.lock();
    if let Some(count) = inflight.get_mut(queue_key) {
        *count -= 1;
        if *count == 0 {
            inflight.remove(queue_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interrogator::InterrogationOutput;
    use crate::runtime::TokioSpawner;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Clone)]
    struct StubInterrogator;

    #[async_trait]
    impl Interrogator for StubInterrogator {
        async fn interrogate(
            &self,
            model: &str,
            image: &[u8],
            threshold: f32,
        ) -> Result<InterrogationOutput, EngineError> {
            if model == "missing" {
                return Err(EngineError::ModelUnavailable(model.to_string()));
            }
            Ok(InterrogationOutput {
                tags: HashMap::from([
                    ("len".to_string(), image.len() as f32),
                    ("thr".to_string(), threshold),
                ]),
                ratings: HashMap::from([("general".to_string(), 0.5)]),
            })
        }
    }

    fn make_engine() -> BatchEngine<StubInterrogator, TokioSpawner> {
        let config = EngineConfig {
            idle_delay_ms: 10,
            ..EngineConfig::default()
        };
        BatchEngine::new(config, StubInterrogator, TokioSpawner::current()).unwrap()
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[tokio::test]
    async fn test_named_item_returns_running_snapshot() {
        let engine = make_engine();

        let outcome = engine
            .submit("wd14", "batch1", "img1", b"aaaa".to_vec(), 0.35)
            .await
            .unwrap();

        let SubmitOutcome::Accepted(snapshot) = outcome else {
            panic!("expected running snapshot");
        };
        assert_eq!(snapshot["wd14"]["batch1"], 1.0);
    }

    #[tokio::test]
    async fn test_threshold_and_ratings_pass_through() {
        let engine = make_engine();

        engine
            .submit("wd14", "b", "x", b"123".to_vec(), 0.42)
            .await
            .unwrap();
        let outcome = engine
            .submit("wd14", "b", "", Vec::new(), 0.0)
            .await
            .unwrap();

        let SubmitOutcome::BatchClosed(results) = outcome else {
            panic!("expected closed batch");
        };
        let bag = &results["x"];
        assert_eq!(bag["thr"], 0.42);
        assert_eq!(bag["len"], 3.0);
        assert_eq!(bag["rating:general"], 0.5);
    }

    #[tokio::test]
    async fn test_runner_stops_after_close_and_restarts() {
        let engine = make_engine();

        engine
            .submit("wd14", "b", "x", b"1".to_vec(), 0.0)
            .await
            .unwrap();
        engine.submit("wd14", "b", "", Vec::new(), 0.0).await.unwrap();

        let probe = engine.clone();
        wait_until(move || !probe.is_draining() && probe.registered_models().is_empty()).await;

        // A fresh submission recreates the queue and restarts the loop.
        let outcome = engine
            .submit("wd14", "b2", "y", b"22".to_vec(), 0.0)
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Accepted(_)));
    }

    #[tokio::test]
    async fn test_unavailable_model_fails_only_its_caller() {
        let engine = make_engine();

        let err = engine
            .submit("missing", "b", "x", b"1".to_vec(), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelUnavailable(_)));

        let ok = engine
            .submit("wd14", "b", "y", b"1".to_vec(), 0.0)
            .await;
        assert!(ok.is_ok());
    }
}
