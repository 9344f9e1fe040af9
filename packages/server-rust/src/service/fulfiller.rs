//! Promise fulfiller (C8): consumes a promise's attempt, runs its registered
//! action, and deletes it on success.
//!
//! `try_fulfill` never propagates an error except the one genuine
//! programmer-error case (`ConsumeAttempt` called on a promise that was
//! already consumed, or never stored) — an action failure, a store failure,
//! or an unregistered action name are all counted, logged, and swallowed, so
//! a thrown error here can never cause an outer retry wrapper to redo
//! already-committed work.

use tokio::sync::watch;

use crate::cancellation;
use crate::error::{EngineError, EngineResult};
use crate::service::promise::Promise;
use crate::service::registry::ActionRegistry;
use crate::service::resilience::resilient;
use crate::storage::store::DocumentStore;

/// Above this attempt count, a fulfillment failure logs at `Error` instead
/// of `Warning` — enough retries that the salvager is no longer just
/// absorbing ordinary transient contention.
const WARNING_ATTEMPT_THRESHOLD: u64 = 20;

/// Executes registered actions for promises and cleans them up on success.
#[derive(Clone)]
pub struct PromiseFulfiller {
    store: DocumentStore,
    registry: ActionRegistry,
}

impl PromiseFulfiller {
    #[must_use]
    pub fn new(store: DocumentStore, registry: ActionRegistry) -> Self {
        Self { store, registry }
    }

    /// Consumes `promise`'s attempt, invokes its action under the resilience
    /// pipeline, and deletes it on success. `shutdown` lets an in-flight
    /// fulfillment abandon cleanly if the host is stopping; the salvager's
    /// next pass will pick the promise back up.
    pub async fn try_fulfill(&self, mut promise: Promise, shutdown: &watch::Receiver<bool>) -> EngineResult<()> {
        let now_seconds = self.store.clock().now_millis() / 1000;
        promise.consume_attempt(now_seconds)?;

        let Some(action) = self.registry.get(promise.action_name()) else {
            metrics::counter!("promise_fulfiller_errors_total").increment(1);
            self.log_failure("fulfill", &promise, &EngineError::UnknownAction(promise.action_name().to_string()));
            return Ok(());
        };

        let invoke = resilient("fulfiller.invoke", || async {
            action.invoke(&promise).await.map_err(EngineError::StorageError)
        });

        let outcome = tokio::select! {
            biased;
            () = cancellation::canceled(shutdown) => return Ok(()),
            result = invoke => result,
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = self.delete_promise(&promise).await {
                    metrics::counter!("promise_fulfiller_errors_total").increment(1);
                    self.log_failure("delete", &promise, &err);
                    return Ok(());
                }
                metrics::counter!("promise_fulfiller_successes_total").increment(1);
                if promise.attempt_count() > 1 {
                    metrics::counter!("promise_fulfiller_delayed_successes_total").increment(1);
                }
                Ok(())
            }
            Err(err) => {
                metrics::counter!("promise_fulfiller_errors_total").increment(1);
                self.log_failure("fulfill", &promise, &err);
                Ok(())
            }
        }
    }

    /// Deletes `promise` under the resilience pipeline, ignoring the outer
    /// cancellation signal: a successfully executed action must still be
    /// cleaned up even if the host is mid-shutdown.
    async fn delete_promise(&self, promise: &Promise) -> EngineResult<()> {
        let pk = promise.partition().clone();
        let id = promise.id().to_string();
        resilient("fulfiller.delete", || {
            let store = self.store.clone();
            let pk = pk.clone();
            let id = id.clone();
            async move {
                let mut tx = store.create_transaction(pk);
                tx.delete_by_id(id, true)?;
                tx.commit(&cancellation::never()).await?;
                Ok(())
            }
        })
        .await
    }

    fn log_failure(&self, step: &'static str, promise: &Promise, err: &EngineError) {
        let attempt = promise.attempt_count();
        if attempt <= WARNING_ATTEMPT_THRESHOLD {
            tracing::warn!(
                step,
                action = promise.action_name(),
                id = promise.id(),
                attempt,
                error.kind = err.kind(),
                error.message = %err,
                "promise fulfillment failed"
            );
        } else {
            tracing::error!(
                step,
                action = promise.action_name(),
                id = promise.id(),
                attempt,
                error.kind = err.kind(),
                error.message = %err,
                "promise fulfillment failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use promise_core::clock::ManualClock;

    use super::*;
    use crate::service::registry::Action;
    use crate::storage::backends::NullBackend;
    use crate::storage::engines::HashMapStorage;

    struct CountingAction {
        calls: Arc<AtomicU32>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl Action for CountingAction {
        async fn invoke(&self, _promise: &Promise) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = &self.fail_with {
                return Err(anyhow::anyhow!(msg.clone()));
            }
            Ok(())
        }
    }

    fn env() -> (DocumentStore, ActionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = DocumentStore::new(Arc::new(HashMapStorage::new()), Arc::new(NullBackend), clock.clone());
        (store, ActionRegistry::new(), clock)
    }

    fn never_shutdown() -> watch::Receiver<bool> {
        cancellation::never()
    }

    #[tokio::test]
    async fn successful_action_deletes_promise() {
        let (store, registry, clock) = env();
        let calls = Arc::new(AtomicU32::new(0));
        registry.register(
            "send-email",
            Arc::new(CountingAction {
                calls: calls.clone(),
                fail_with: None,
            }),
        );

        let mut promise = Promise::create(&registry, "send-email", "payload", clock.as_ref()).unwrap();
        let pk = promise.partition().clone();
        let mut tx = store.create_transaction(pk.clone());
        tx.add(promise.to_document()).unwrap();
        let committed = tx.commit(&cancellation::never()).await.unwrap();
        promise.apply_committed(&committed[0]);
        tx.finish().unwrap();

        let fulfiller = PromiseFulfiller::new(store.clone(), registry);
        fulfiller.try_fulfill(promise, &never_shutdown()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let remaining = store.list(&pk, &|_| true, None, &crate::storage::engine::IterationCursor::start(), 10);
        assert!(remaining.items.is_empty());
    }

    #[tokio::test]
    async fn failing_action_is_swallowed_and_keeps_promise() {
        let (store, registry, clock) = env();
        registry.register(
            "send-email",
            Arc::new(CountingAction {
                calls: Arc::new(AtomicU32::new(0)),
                fail_with: Some("Test exception.".to_string()),
            }),
        );

        let mut promise = Promise::create(&registry, "send-email", "payload", clock.as_ref()).unwrap();
        let pk = promise.partition().clone();
        let mut tx = store.create_transaction(pk.clone());
        tx.add(promise.to_document()).unwrap();
        let committed = tx.commit(&cancellation::never()).await.unwrap();
        promise.apply_committed(&committed[0]);
        tx.finish().unwrap();

        let fulfiller = PromiseFulfiller::new(store.clone(), registry);
        let result = fulfiller.try_fulfill(promise, &never_shutdown()).await;
        assert!(result.is_ok());

        let remaining = store.list(&pk, &|_| true, None, &crate::storage::engine::IterationCursor::start(), 10);
        assert_eq!(remaining.items.len(), 1);
    }

    #[tokio::test]
    async fn consume_attempt_bug_propagates_invalid_state() {
        let (store, registry, clock) = env();
        registry.register(
            "send-email",
            Arc::new(CountingAction {
                calls: Arc::new(AtomicU32::new(0)),
                fail_with: None,
            }),
        );
        let promise = Promise::create(&registry, "send-email", "payload", clock.as_ref()).unwrap();

        let fulfiller = PromiseFulfiller::new(store, registry);
        let err = fulfiller.try_fulfill(promise, &never_shutdown()).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidState");
    }

    #[tokio::test]
    async fn shutdown_signal_exits_without_deleting() {
        let (store, registry, clock) = env();
        registry.register(
            "send-email",
            Arc::new(CountingAction {
                calls: Arc::new(AtomicU32::new(0)),
                fail_with: None,
            }),
        );

        let mut promise = Promise::create(&registry, "send-email", "payload", clock.as_ref()).unwrap();
        let pk = promise.partition().clone();
        let mut tx = store.create_transaction(pk.clone());
        tx.add(promise.to_document()).unwrap();
        let committed = tx.commit(&cancellation::never()).await.unwrap();
        promise.apply_committed(&committed[0]);
        tx.finish().unwrap();

        let (tx_signal, rx_signal) = watch::channel(true);
        drop(tx_signal);

        let fulfiller = PromiseFulfiller::new(store.clone(), registry);
        fulfiller.try_fulfill(promise, &rx_signal).await.unwrap();

        let remaining = store.list(&pk, &|_| true, None, &crate::storage::engine::IterationCursor::start(), 10);
        assert_eq!(remaining.items.len(), 1, "canceled fulfillment must leave the promise in place");
    }
}
