//! Momentary-lock factory (C5): single- and multi-key short-TTL global
//! mutexes built from unique-key documents that self-expire if a release is
//! ever missed.
//!
//! The multi-key release barrier borrows the teacher's
//! [`crate::network::shutdown::ShutdownController`] idiom of pairing an
//! atomic counter with an async notification primitive — there it counts
//! in-flight requests down to zero to know when draining is complete; here
//! it counts un-arrived holders down to zero to know when every lock in the
//! set is simultaneously held.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, Notify};
use tokio::time::sleep;

use promise_core::unique_key::TTL_SECONDS;
use promise_core::{PartitionKey, UniqueKeyValue};

use crate::cancellation;
use crate::error::{EngineError, EngineResult};
use crate::storage::document::Document;
use crate::storage::store::DocumentStore;

const MAX_RETRIES: u32 = 10;
const BACKOFF_BASE_MS: u64 = 30;

fn half_ttl() -> Duration {
    Duration::from_secs(u64::from(TTL_SECONDS) / 2)
}

fn jittered_backoff(attempt: u32) -> Duration {
    let base_ms = BACKOFF_BASE_MS * 2u64.saturating_pow(attempt.min(8));
    let jitter_ms = rand::rng().random_range(0..=base_ms / 2 + 1);
    Duration::from_millis(base_ms + jitter_ms)
}

/// A cheap, cloneable reference to a held lock's storage location, used by a
/// holder task to refresh its TTL without taking ownership of the [`Lock`]
/// that will ultimately release it.
#[derive(Clone, Debug)]
struct LockRef {
    store: DocumentStore,
    id: String,
    partition: PartitionKey,
}

impl LockRef {
    /// Unconditionally bumps the item's stored timestamp forward to "now",
    /// extending its TTL window without an etag check — the lock's own
    /// holder is the only writer that should ever touch this key.
    fn refresh_ttl(&self) {
        if let Some(mut doc) = self.store.engine.get(&self.id) {
            doc.ts_seconds = self.store.clock().now_millis() / 1000;
            self.store.engine.put(doc);
        }
    }
}

/// A single acquired momentary lock. Must be released explicitly; an
/// unreleased lock simply expires after its TTL (the safety net the spec
/// relies on instead of a Drop-time network call).
#[derive(Debug)]
pub struct Lock {
    inner: LockRef,
    acquired_at_millis: i64,
}

impl Lock {
    async fn acquire(
        store: &DocumentStore,
        path_segments: &[&str],
        candidate: &str,
        cancel: &watch::Receiver<bool>,
    ) -> EngineResult<Self> {
        let key = UniqueKeyValue::create(path_segments, candidate);
        let pk = PartitionKey::for_string(key.partition().to_string())?;

        let mut attempt = 0u32;
        loop {
            if cancellation::is_canceled(cancel) {
                return Err(EngineError::Canceled);
            }

            let doc = Document::new(key.id(), pk.as_str())
                .with_field("Uniq_Path", key.path())
                .with_field("Uniq_Val", key.value())
                .with_ttl(TTL_SECONDS);

            let mut tx = store.create_transaction(pk.clone());
            tx.add(doc)?;

            match tx.commit(cancel).await {
                Ok(_) => {
                    return Ok(Self {
                        inner: LockRef {
                            store: store.clone(),
                            id: key.id().to_string(),
                            partition: pk,
                        },
                        acquired_at_millis: store.clock().now_millis(),
                    });
                }
                Err(EngineError::ConcurrencyConflict) => {
                    if attempt >= MAX_RETRIES {
                        return Err(EngineError::LockUnavailable);
                    }
                    tokio::select! {
                        () = cancellation::canceled(cancel) => return Err(EngineError::Canceled),
                        () = sleep(jittered_backoff(attempt)) => {}
                    }
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn handle(&self) -> LockRef {
        self.inner.clone()
    }

    /// Deletes the underlying claim item, releasing the lock for other
    /// callers. Logs a warning (does not fail) if released past its TTL.
    /// Ignores the outer cancellation signal: a held lock must always be
    /// released, or it leaks until its TTL expires on its own.
    pub async fn release(self) {
        let elapsed_seconds = (self.inner.store.clock().now_millis() - self.acquired_at_millis) / 1000;
        if elapsed_seconds > i64::from(TTL_SECONDS) {
            tracing::warn!(
                lock_id = %self.inner.id,
                elapsed_seconds,
                "released momentary lock after its TTL had already elapsed"
            );
        }
        let mut tx = self.inner.store.create_transaction(self.inner.partition.clone());
        if tx.delete_by_id(self.inner.id.clone(), true).is_ok() {
            let _ = tx.commit(&cancellation::never()).await;
        }
    }
}

/// Counts holders that have not yet simultaneously arrived. Reaching zero
/// fires [`Notify::notify_waiters`] once; any holder still waiting wakes up
/// and returns, ending its refresh loop.
struct LockSynchronizer {
    remaining: AtomicU32,
    notify: Notify,
}

impl LockSynchronizer {
    fn new(n: u32) -> Self {
        Self {
            remaining: AtomicU32::new(n),
            notify: Notify::new(),
        }
    }

    fn arrive(&self) -> bool {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        prev == 1
    }

    fn depart(&self) {
        self.remaining.fetch_add(1, Ordering::AcqRel);
    }
}

async fn run_holder(synchronizer: Arc<LockSynchronizer>, lock_ref: LockRef) {
    loop {
        let notified = synchronizer.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if synchronizer.arrive() {
            synchronizer.notify.notify_waiters();
            return;
        }

        tokio::select! {
            () = &mut notified => return,
            () = sleep(half_ttl()) => {
                synchronizer.depart();
                lock_ref.refresh_ttl();
            }
        }
    }
}

/// A set of locks acquired together via [`MomentaryLockFactory::wait_range`].
/// Releasing drops every underlying lock in reverse acquisition order.
pub struct CompositeLock {
    locks: Vec<Lock>,
    acquired_at_millis: i64,
    clock_millis_now: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl std::fmt::Debug for CompositeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeLock")
            .field("locks", &self.locks)
            .field("acquired_at_millis", &self.acquired_at_millis)
            .finish_non_exhaustive()
    }
}

impl CompositeLock {
    /// True if more than `TTL/2` has elapsed since every lock in the set was
    /// simultaneously held — the caller's safe-use budget has run out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let half_ttl_millis = i64::from(TTL_SECONDS) * 1000 / 2;
        (self.clock_millis_now)() - self.acquired_at_millis > half_ttl_millis
    }

    /// Releases every lock in the set, in reverse acquisition order.
    pub async fn release(self) {
        if self.is_expired() {
            tracing::warn!("composite lock released after its half-TTL safe-use budget had already elapsed");
        }
        for lock in self.locks.into_iter().rev() {
            lock.release().await;
        }
    }
}

/// Acquires one or more short-lived, self-refreshing global locks backed by
/// unique-key claim documents.
pub struct MomentaryLockFactory {
    store: DocumentStore,
}

impl MomentaryLockFactory {
    /// Builds a factory over `store`, used as the backing document store for
    /// every claim item this factory creates.
    #[must_use]
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Acquires a single global lock keyed by `(path_segments, candidate)`.
    /// Cancellable: on cancellation, a retry already in backoff returns
    /// [`EngineError::Canceled`] instead of retrying further.
    pub async fn wait(&self, path_segments: &[&str], candidate: &str, cancel: &watch::Receiver<bool>) -> EngineResult<Lock> {
        Lock::acquire(&self.store, path_segments, candidate, cancel).await
    }

    /// Acquires every lock in `keys` without risking deadlock against another
    /// caller racing for an overlapping set: keys are sorted by their
    /// candidate value before sequential acquisition.
    ///
    /// Cancellable: on cancellation, every lock acquired so far is released
    /// in reverse order before returning [`EngineError::Canceled`].
    pub async fn wait_range(&self, keys: &[(&[&str], &str)], cancel: &watch::Receiver<bool>) -> EngineResult<CompositeLock> {
        let mut sorted: Vec<(&[&str], &str)> = keys.to_vec();
        sorted.sort_by_key(|(_, candidate)| *candidate);

        let n = u32::try_from(sorted.len()).unwrap_or(u32::MAX);
        let synchronizer = Arc::new(LockSynchronizer::new(n));
        let mut acquired: Vec<Lock> = Vec::with_capacity(sorted.len());
        let mut holders = Vec::with_capacity(sorted.len());

        for (segments, candidate) in &sorted {
            if cancellation::is_canceled(cancel) {
                for lock in acquired.into_iter().rev() {
                    lock.release().await;
                }
                return Err(EngineError::Canceled);
            }

            match Lock::acquire(&self.store, segments, candidate, cancel).await {
                Ok(lock) => {
                    let handle = lock.handle();
                    holders.push(tokio::spawn(run_holder(Arc::clone(&synchronizer), handle)));
                    acquired.push(lock);
                }
                Err(err) => {
                    for lock in acquired.into_iter().rev() {
                        lock.release().await;
                    }
                    return Err(err);
                }
            }
        }

        for holder in holders {
            let _ = holder.await;
        }

        let clock = self.store.clock().clone();
        Ok(CompositeLock {
            locks: acquired,
            acquired_at_millis: clock.now_millis(),
            clock_millis_now: Box::new(move || clock.now_millis()),
        })
    }
}
