//! Single-partition batch of ≤ 100 writes, committed atomically with etag
//! back-fill in submission order.
//!
//! A [`Transaction`] is the only way to mutate a [`super::store::DocumentStore`].
//! It buffers `Add`/`Update`/`Delete` operations against one partition, then
//! `commit()`s them as one batch: on success every mutated document's `etag`
//! is overwritten in the order it was submitted, mirroring the teacher's
//! "walk the originally submitted entity list and overwrite each entity's
//! etag field" back-fill pattern. A transaction that still holds a
//! first-attempt, available promise when it is rolled back, or finished
//! without consuming or suppressing that promise, fails `ForgottenPromise`.

use std::collections::HashSet;

use promise_core::PartitionKey;
use tokio::sync::watch;

use crate::cancellation;
use crate::error::{EngineError, EngineResult};
use crate::storage::document::Document;
use crate::storage::store::DocumentStore;

/// Hard cap on operations per transaction, per the repository contract.
pub const MAX_OPERATIONS: usize = 100;

enum TxOp {
    Add(Document),
    Update(Document),
    DeleteEntity(Document),
    DeleteById {
        id: String,
        ignores_concurrency_protection: bool,
    },
}

/// A buffered, single-partition batch of writes.
///
/// Must be consumed by [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback); dropping it without either is itself
/// a rollback (the batch was never sent), best-effort logged if it still
/// held a forgotten promise obligation.
pub struct Transaction {
    store: DocumentStore,
    pk: PartitionKey,
    ops: Vec<TxOp>,
    promise_obligations: HashSet<String>,
    disposed: bool,
}

impl Transaction {
    pub(crate) fn new(store: DocumentStore, pk: PartitionKey) -> Self {
        Self {
            store,
            pk,
            ops: Vec::new(),
            promise_obligations: HashSet::new(),
            disposed: false,
        }
    }

    /// The partition this transaction is scoped to.
    #[must_use]
    pub fn partition(&self) -> &PartitionKey {
        &self.pk
    }

    /// Queues an insert of a brand-new entity.
    pub fn add(&mut self, doc: Document) -> EngineResult<()> {
        self.check_partition(&doc)?;
        self.check_capacity()?;
        self.ops.push(TxOp::Add(doc));
        Ok(())
    }

    /// Queues inserts of several brand-new entities.
    pub fn add_range(&mut self, docs: impl IntoIterator<Item = Document>) -> EngineResult<()> {
        for doc in docs {
            self.add(doc)?;
        }
        Ok(())
    }

    /// Queues a conditional replace of an existing entity, keyed by its etag.
    pub fn update(&mut self, doc: Document) -> EngineResult<()> {
        self.check_partition(&doc)?;
        self.check_capacity()?;
        self.ops.push(TxOp::Update(doc));
        Ok(())
    }

    /// Queues a conditional delete of an existing entity, keyed by its etag
    /// unless `ignores_concurrency_protection` is set.
    pub fn delete_entity(&mut self, doc: Document, ignores_concurrency_protection: bool) -> EngineResult<()> {
        self.check_partition(&doc)?;
        self.check_capacity()?;
        let mut doc = doc;
        if ignores_concurrency_protection {
            doc.etag = None;
        }
        self.ops.push(TxOp::DeleteEntity(doc));
        Ok(())
    }

    /// Queues an unconditional delete by id. Requires
    /// `ignores_concurrency_protection = true` explicitly: an id-only delete
    /// has no etag to check against, so the caller must opt in.
    pub fn delete_by_id(
        &mut self,
        id: impl Into<String>,
        ignores_concurrency_protection: bool,
    ) -> EngineResult<()> {
        if !ignores_concurrency_protection {
            return Err(EngineError::InvalidState(
                "Delete(id) requires ignores_concurrency_protection = true".to_string(),
            ));
        }
        self.check_capacity()?;
        self.ops.push(TxOp::DeleteById {
            id: id.into(),
            ignores_concurrency_protection,
        });
        Ok(())
    }

    /// Registers that this transaction is responsible for either consuming
    /// or suppressing the first attempt of the promise identified by `id`
    /// before it is disposed. Called by the promise lifecycle (C7) when it
    /// adds a freshly created promise to this transaction.
    pub fn register_promise_obligation(&mut self, id: impl Into<String>) {
        self.promise_obligations.insert(id.into());
    }

    /// Clears a previously registered obligation (the promise was consumed
    /// or suppressed within this same transaction before disposal).
    pub fn clear_promise_obligation(&mut self, id: &str) {
        self.promise_obligations.remove(id);
    }

    fn check_partition(&self, doc: &Document) -> EngineResult<()> {
        if doc.partition != self.pk.as_str() {
            return Err(EngineError::InvalidState(format!(
                "entity partition {:?} does not match transaction partition {:?}",
                doc.partition,
                self.pk.as_str()
            )));
        }
        Ok(())
    }

    fn check_capacity(&self) -> EngineResult<()> {
        if self.ops.len() >= MAX_OPERATIONS {
            return Err(EngineError::InvalidState(format!(
                "transaction exceeds the {MAX_OPERATIONS}-operation limit"
            )));
        }
        Ok(())
    }

    fn forgotten_promise(&self) -> EngineResult<()> {
        if let Some(id) = self.promise_obligations.iter().next() {
            return Err(EngineError::ForgottenPromise(id.clone()));
        }
        Ok(())
    }

    /// Atomically applies every queued operation.
    ///
    /// On success, every added/updated document's `etag` is assigned in
    /// submission order. Fails [`EngineError::ConcurrencyConflict`] if any
    /// update/delete's expected etag no longer matches storage, or
    /// [`EngineError::Canceled`] if `cancel` already carries a cancellation
    /// signal. The check is made once, before the first write: once a commit
    /// has started applying its batch it runs to completion rather than
    /// stopping partway, so pass [`cancellation::never`] for a commit that
    /// must not be abandoned regardless of the caller's own cancellation.
    ///
    /// Does not by itself check for a forgotten promise obligation: unlike a
    /// disposable-scoped transaction, a committed `Transaction` here stays
    /// alive so a caller can still consume or suppress a freshly created
    /// promise's first attempt afterward (it needs the etag `commit` just
    /// assigned to do so). Call [`finish`](Self::finish) once that decision
    /// has been made, to enforce the obligation as a hard error; an
    /// un-finished transaction still logs a best-effort warning on drop.
    pub async fn commit(&mut self, cancel: &watch::Receiver<bool>) -> EngineResult<Vec<Document>> {
        self.check_conflicts()?;
        if cancellation::is_canceled(cancel) {
            return Err(EngineError::Canceled);
        }

        let now_seconds = self.store.clock.now_millis() / 1000;
        let mut committed = Vec::with_capacity(self.ops.len());

        for op in self.ops.drain(..) {
            match op {
                TxOp::Add(mut doc) | TxOp::Update(mut doc) => {
                    doc.etag = Some(uuid::Uuid::new_v4().to_string());
                    doc.ts_seconds = now_seconds;
                    self.store.engine.put(doc.clone());
                    self.store
                        .backend
                        .add(&doc.partition, &doc.id, &doc)
                        .await?;
                    committed.push(doc);
                }
                TxOp::DeleteEntity(doc) => {
                    self.store.engine.remove(&doc.id);
                    self.store.backend.remove(&doc.partition, &doc.id).await?;
                }
                TxOp::DeleteById { id, .. } => {
                    self.store.engine.remove(&id);
                    self.store.backend.remove(self.pk.as_str(), &id).await?;
                }
            }
        }

        Ok(committed)
    }

    /// Discards every queued operation without touching storage. Terminal:
    /// checks the forgotten-promise obligation immediately, since a rolled
    /// back promise has no etag and so can only have been legally resolved
    /// (suppressed) before this call.
    pub fn rollback(mut self) -> EngineResult<()> {
        self.ops.clear();
        self.disposed = true;
        self.forgotten_promise()
    }

    /// Ends the transaction's life, enforcing the forgotten-promise
    /// obligation as a hard error. Call after `commit` once any freshly
    /// created promise has been consumed or suppressed.
    pub fn finish(mut self) -> EngineResult<()> {
        self.disposed = true;
        self.forgotten_promise()
    }

    /// Verifies every `Update`/`DeleteEntity` op's expected etag still
    /// matches what is currently stored, and that every `Add` targets a key
    /// with no live (non-expired) occupant, without applying anything.
    fn check_conflicts(&self) -> EngineResult<()> {
        let now_seconds = self.store.clock.now_millis() / 1000;
        for op in &self.ops {
            match op {
                TxOp::Add(doc) => {
                    if let Some(existing) = self.store.engine.get(&doc.id) {
                        if !existing.is_expired(now_seconds) {
                            return Err(EngineError::ConcurrencyConflict);
                        }
                    }
                }
                TxOp::Update(doc) | TxOp::DeleteEntity(doc) => {
                    let current = self.store.engine.get(&doc.id);
                    match (current, &doc.etag) {
                        (Some(current), Some(expected_etag))
                            if current.etag.as_deref() == Some(expected_etag.as_str()) => {}
                        (None, None) => {}
                        _ => return Err(EngineError::ConcurrencyConflict),
                    }
                }
                TxOp::DeleteById { .. } => {}
            }
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.disposed && !self.promise_obligations.is_empty() {
            tracing::error!(
                partition = self.pk.as_str(),
                "transaction dropped without commit or rollback while holding a forgotten promise obligation"
            );
        }
    }
}
