//! The promise salvager (C9): a background long-running task that discovers
//! neglected promises and hands them back to the fulfiller.
//!
//! The `Running -> Stopping -> Stopped` lifecycle mirrors
//! [`crate::network::shutdown::ShutdownController`]'s `ArcSwap`-backed health
//! state machine, narrowed to this task's own three states instead of the
//! host's four.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::Rng;
use tokio::sync::watch;

use crate::error::{EngineError, EngineResult};
use crate::service::fulfiller::PromiseFulfiller;
use crate::service::promise::{self, Promise};
use crate::storage::document::Document;
use crate::storage::engine::IterationCursor;
use crate::storage::store::DocumentStore;

/// Default average delay between drain passes, used when a caller has no
/// stronger opinion (matches [`crate::service::config::PromiseEngineConfig`]'s
/// own default).
pub const DEFAULT_AVERAGE_DELAY_SECONDS: u64 = 60;
/// Default page size for a drain batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Lifecycle state of a running [`PromiseSalvager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalvagerState {
    Running,
    Stopping,
    Stopped,
}

/// Background loop that periodically claims and fulfills promises nobody has
/// acted on in time.
pub struct PromiseSalvager {
    store: DocumentStore,
    fulfiller: PromiseFulfiller,
    state: Arc<ArcSwap<SalvagerState>>,
    shutdown: watch::Receiver<bool>,
    average_delay_seconds: u64,
    batch_size: usize,
}

impl PromiseSalvager {
    /// Builds a salvager with the given drain cadence and batch size.
    #[must_use]
    pub fn new(
        store: DocumentStore,
        fulfiller: PromiseFulfiller,
        shutdown: watch::Receiver<bool>,
        average_delay_seconds: u64,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            fulfiller,
            state: Arc::new(ArcSwap::from_pointee(SalvagerState::Stopped)),
            shutdown,
            average_delay_seconds,
            batch_size,
        }
    }

    /// The salvager's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SalvagerState {
        **self.state.load()
    }

    /// Runs the main loop until the shutdown signal fires. Intended to be
    /// spawned as its own task at host start.
    pub async fn run(&self) {
        self.state.store(Arc::new(SalvagerState::Running));

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = jittered_delay(self.average_delay_seconds);
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                drain_result = async {
                    let (_, result) = tokio::join!(tokio::time::sleep(delay), self.drain_due_promises());
                    result
                } => {
                    if let Err(err) = drain_result {
                        tracing::error!(
                            error.kind = err.kind(),
                            error.message = %err,
                            "Background fulfillment of neglected promises encountered an error"
                        );
                    }
                }
            }
        }

        self.state.store(Arc::new(SalvagerState::Stopping));
        self.state.store(Arc::new(SalvagerState::Stopped));
    }

    /// Fetches and claims due promises in bounded batches, delegating each
    /// successfully claimed one to the fulfiller. Exposed directly (not just
    /// via [`run`](Self::run)) so a single pass can be driven synchronously
    /// by tests or by an opportunistic "fulfill due promises now" call.
    pub async fn drain_due_promises(&self) -> EngineResult<()> {
        let mut cursor = IterationCursor::start();
        let mut expect_more = true;

        while expect_more && !*self.shutdown.borrow() {
            let now_seconds = self.store.clock().now_millis() / 1000;
            let page = self.fetch_due_batch(now_seconds, &cursor).await?;

            for doc in &page.items {
                self.claim_and_fulfill(doc, now_seconds).await?;
            }

            expect_more = page.items.len() == self.batch_size;
            cursor = page.next_cursor;
        }
        Ok(())
    }

    async fn fetch_due_batch(
        &self,
        now_seconds: i64,
        cursor: &IterationCursor,
    ) -> EngineResult<crate::storage::engine::FetchResult<Document>> {
        crate::service::resilience::resilient("salvager.fetch_due_batch", || {
            let cursor = cursor.clone();
            async move {
                Ok(self.store.list_cross_partition(
                    &|doc| promise::due_seconds_of(doc).is_some_and(|due| due <= now_seconds),
                    Some(&|doc: &Document| doc.field_str("Promise_Due").unwrap_or_default().to_string()),
                    &cursor,
                    self.batch_size,
                ))
            }
        })
        .await
    }

    async fn claim_and_fulfill(&self, doc: &Document, now_seconds: i64) -> EngineResult<()> {
        let mut promise = match Promise::from_document(doc) {
            Ok(promise) => promise,
            Err(err) => {
                tracing::error!(id = doc.id, error.kind = err.kind(), "skipping malformed promise document in salvager batch");
                return Ok(());
            }
        };

        if promise.claim_for_attempt(now_seconds).is_err() {
            // Another worker's concurrent claim (or stale batch) made this
            // no longer due; nothing to do.
            return Ok(());
        }

        match self.try_claim(&mut promise).await? {
            true => {
                let _ = self.fulfiller.try_fulfill(promise, &self.shutdown).await;
            }
            false => {
                // Another worker snatched the etag-conditional claim first.
            }
        }
        Ok(())
    }

    /// Etag-conditional patch of `Due`/`AttemptCount`. Returns `Ok(false)`
    /// (not an error) when another worker's claim won the race or the
    /// salvager's own shutdown fired mid-commit — both leave the promise
    /// untouched for the next drain pass to pick up.
    async fn try_claim(&self, promise: &mut Promise) -> EngineResult<bool> {
        let pk = promise.partition().clone();
        let mut tx = self.store.create_transaction(pk);
        tx.update(promise.to_document())?;
        match tx.commit(&self.shutdown).await {
            Ok(mut committed) => {
                promise.apply_committed(&committed.remove(0));
                tx.finish()?;
                Ok(true)
            }
            Err(EngineError::ConcurrencyConflict | EngineError::Canceled) => Ok(false),
            Err(other) => Err(other),
        }
    }
}

/// `average_delay +/- random(average_delay / 4)`, clamped to at least one
/// second.
fn jittered_delay(average_delay_seconds: u64) -> Duration {
    let jitter_range = (average_delay_seconds / 4).max(1) as i64;
    let offset = rand::rng().random_range(-jitter_range..=jitter_range);
    let total = i64::try_from(average_delay_seconds).unwrap_or(0) + offset;
    Duration::from_secs(u64::try_from(total.max(1)).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use promise_core::clock::ManualClock;

    use super::*;
    use crate::service::registry::{Action, ActionRegistry};
    use crate::storage::backends::NullBackend;
    use crate::storage::engines::HashMapStorage;

    struct CountingAction(Arc<AtomicU32>);

    #[async_trait]
    impl Action for CountingAction {
        async fn invoke(&self, _promise: &Promise) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn env() -> (DocumentStore, ActionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = DocumentStore::new(Arc::new(HashMapStorage::new()), Arc::new(NullBackend), clock.clone());
        (store, ActionRegistry::new(), clock)
    }

    fn never_shutdown() -> watch::Receiver<bool> {
        crate::cancellation::never()
    }

    async fn insert_due_promise(store: &DocumentStore, registry: &ActionRegistry, clock: &ManualClock) {
        let mut promise = Promise::create(registry, "send-email", "payload", clock).unwrap();
        let pk = promise.partition().clone();
        let mut tx = store.create_transaction(pk);
        tx.add(promise.to_document()).unwrap();
        let committed = tx.commit(&crate::cancellation::never()).await.unwrap();
        promise.apply_committed(&committed[0]);
        tx.finish().unwrap();
    }

    #[tokio::test]
    async fn drain_fulfills_due_promise() {
        let (store, registry, clock) = env();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register("send-email", Arc::new(CountingAction(calls.clone())));
        insert_due_promise(&store, &registry, &clock).await;

        clock.advance_millis(promise::CLAIM_DURATION_SECONDS * 1000);

        let fulfiller = PromiseFulfiller::new(store.clone(), registry.clone());
        let salvager = PromiseSalvager::new(store.clone(), fulfiller, never_shutdown(), DEFAULT_AVERAGE_DELAY_SECONDS, DEFAULT_BATCH_SIZE);
        salvager.drain_due_promises().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_skips_promises_not_yet_due() {
        let (store, registry, clock) = env();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register("send-email", Arc::new(CountingAction(calls.clone())));
        insert_due_promise(&store, &registry, &clock).await;

        let fulfiller = PromiseFulfiller::new(store.clone(), registry.clone());
        let salvager = PromiseSalvager::new(store.clone(), fulfiller, never_shutdown(), DEFAULT_AVERAGE_DELAY_SECONDS, DEFAULT_BATCH_SIZE);
        salvager.drain_due_promises().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_drain_does_not_refulfill_a_completed_promise() {
        let (store, registry, clock) = env();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register("send-email", Arc::new(CountingAction(calls.clone())));
        insert_due_promise(&store, &registry, &clock).await;
        clock.advance_millis(promise::CLAIM_DURATION_SECONDS * 1000);

        let fulfiller = PromiseFulfiller::new(store.clone(), registry.clone());
        let salvager = PromiseSalvager::new(store.clone(), fulfiller, never_shutdown(), DEFAULT_AVERAGE_DELAY_SECONDS, DEFAULT_BATCH_SIZE);

        salvager.drain_due_promises().await.unwrap();
        clock.advance_millis(promise::CLAIM_DURATION_SECONDS * 1000);
        salvager.drain_due_promises().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "a fulfilled promise is deleted and must not be picked up again");
    }
}
