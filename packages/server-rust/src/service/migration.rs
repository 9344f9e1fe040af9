//! Forward-only schema-migration coordinator (C10): applies a registered,
//! ordered list of container-property deltas exactly once each, serializing
//! concurrent starters through the momentary-lock factory (C5).
//!
//! The lock + double-check + catch-up loop follows the same shape as
//! [`crate::service::locks`]'s own acquire-retry pattern: optimistic reads,
//! a lock only around the decision to start the next step, and a re-check
//! after acquiring it so two hosts racing to start the same migration don't
//! both apply it.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::watch;

use promise_core::PartitionKey;

use crate::cancellation;
use crate::error::{EngineError, EngineResult};
use crate::service::locks::MomentaryLockFactory;
use crate::service::resilience::resilient;
use crate::storage::document::Document;
use crate::storage::engine::IterationCursor;
use crate::storage::store::DocumentStore;

const MIGRATIONS_PARTITION: &str = "Migrations";
const CONTAINER_PROPERTIES_ID: &str = "ContainerProperties";

/// One registered schema delta: a stable name plus the deterministic mutation
/// it applies to the container's stored properties.
pub struct MigrationStep {
    pub description: &'static str,
    pub apply: Arc<dyn Fn(&mut Map<String, Value>) + Send + Sync>,
}

impl MigrationStep {
    #[must_use]
    pub fn new(description: &'static str, apply: impl Fn(&mut Map<String, Value>) + Send + Sync + 'static) -> Self {
        Self {
            description,
            apply: Arc::new(apply),
        }
    }
}

/// Runs a host's registered migration steps to completion, coordinating with
/// any other host doing the same over the same store.
pub struct MigrationCoordinator {
    store: DocumentStore,
    locks: MomentaryLockFactory,
    steps: Vec<MigrationStep>,
}

impl MigrationCoordinator {
    #[must_use]
    pub fn new(store: DocumentStore, steps: Vec<MigrationStep>) -> Self {
        let locks = MomentaryLockFactory::new(store.clone());
        Self { store, locks, steps }
    }

    /// Applies every not-yet-applied step in order, then returns. Safe to
    /// call from multiple hosts concurrently against the same store.
    ///
    /// Checked at the head of each iteration: on cancellation, returns
    /// [`EngineError::Canceled`] without starting another step. A step
    /// already in progress still finishes its property write under
    /// resilience, but records itself as applied with no cancellation (a
    /// fresh context), so a canceled run never leaves a step half-applied.
    pub async fn migrate(&self, cancel: &watch::Receiver<bool>) -> EngineResult<()> {
        tracing::info!("Migrating");
        loop {
            if cancellation::is_canceled(cancel) {
                return Err(EngineError::Canceled);
            }

            let applied = self.count_applied().await?;
            if applied == self.steps.len() {
                break;
            }

            let lock = self.locks.wait(&["Migration"], "Count=0", cancel).await?;
            let applied = self.count_applied().await?;
            if applied == self.steps.len() {
                lock.release().await;
                break;
            }

            let result = self.apply_one(applied, cancel).await;
            lock.release().await;
            result?;
        }
        tracing::info!("Migrated");
        Ok(())
    }

    /// Counts applied migration records, reading every page — the count
    /// query must observe every prior creation, so it cannot stop at a
    /// partial page.
    async fn count_applied(&self) -> EngineResult<usize> {
        let pk = PartitionKey::for_string(MIGRATIONS_PARTITION.to_string())?;
        let mut count = 0usize;
        let mut cursor = IterationCursor::start();
        loop {
            let page = self.store.list(
                &pk,
                &|doc| doc.field_i64("Migration_Cnt").is_some(),
                None,
                &cursor,
                self.steps.len().max(1),
            );
            count += page.items.len();
            if page.next_cursor.finished {
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(count)
    }

    async fn apply_one(&self, index: usize, cancel: &watch::Receiver<bool>) -> EngineResult<()> {
        let step = &self.steps[index];
        let ordinal = index + 1;
        tracing::info!(ordinal, description = step.description, "Migrating to #{ordinal}: {}", step.description);

        let pk = PartitionKey::for_string(MIGRATIONS_PARTITION.to_string())?;
        let mut properties = self.read_properties(&pk).await?;
        (step.apply)(&mut properties);
        self.write_properties(&pk, properties, cancel).await?;
        self.record_applied(&pk, ordinal, step.description).await?;

        tracing::info!(ordinal, description = step.description, "Migrated to #{ordinal}: {}", step.description);
        Ok(())
    }

    async fn read_properties(&self, pk: &PartitionKey) -> EngineResult<Map<String, Value>> {
        Ok(self
            .store
            .load(pk, &|doc| doc.id == CONTAINER_PROPERTIES_ID)?
            .and_then(|doc| doc.fields.get("Properties").cloned())
            .and_then(|value| value.as_object().cloned())
            .unwrap_or_default())
    }

    async fn write_properties(&self, pk: &PartitionKey, properties: Map<String, Value>, cancel: &watch::Receiver<bool>) -> EngineResult<()> {
        resilient("migration.write_properties", || {
            let pk = pk.clone();
            let properties = properties.clone();
            async move {
                let existing = self.store.load(&pk, &|doc| doc.id == CONTAINER_PROPERTIES_ID)?;
                let mut doc = Document::new(CONTAINER_PROPERTIES_ID, pk.as_str().to_string())
                    .with_field("Properties", Value::Object(properties));
                doc.etag = existing.and_then(|e| e.etag);
                let mut tx = self.store.create_transaction(pk);
                if doc.etag.is_some() {
                    tx.update(doc)?;
                } else {
                    tx.add(doc)?;
                }
                tx.commit(cancel).await?;
                Ok(())
            }
        })
        .await
    }

    /// Records the step as applied with no cancellation (a fresh context):
    /// once the property write above has landed, the record of it must be
    /// written too, or a retried migration run would redo the mutation.
    async fn record_applied(&self, pk: &PartitionKey, ordinal: usize, description: &str) -> EngineResult<()> {
        resilient("migration.record_applied", || {
            let pk = pk.clone();
            async move {
                let doc = Document::new(format!("Migration{ordinal:05}"), pk.as_str().to_string())
                    .with_field("Migration_Cnt", ordinal as i64)
                    .with_field("Migration_Dscr", description);
                let mut tx = self.store.create_transaction(pk);
                tx.add(doc)?;
                tx.commit(&cancellation::never()).await?;
                Ok(())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use promise_core::clock::ManualClock;

    use super::*;
    use crate::storage::backends::NullBackend;
    use crate::storage::engines::HashMapStorage;

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(HashMapStorage::new()), Arc::new(NullBackend), Arc::new(ManualClock::new(0)))
    }

    fn steps(calls: Arc<std::sync::Mutex<HashMap<&'static str, u32>>>) -> Vec<MigrationStep> {
        let c1 = calls.clone();
        let c2 = calls.clone();
        vec![
            MigrationStep::new("add default locale", move |props| {
                props.insert("locale".to_string(), Value::String("en-US".to_string()));
                *c1.lock().unwrap().entry("add default locale").or_default() += 1;
            }),
            MigrationStep::new("bump schema version", move |props| {
                props.insert("schemaVersion".to_string(), Value::from(2));
                *c2.lock().unwrap().entry("bump schema version").or_default() += 1;
            }),
        ]
    }

    #[tokio::test]
    async fn migrate_applies_every_step_once() {
        let store = store();
        let calls = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let coordinator = MigrationCoordinator::new(store.clone(), steps(calls.clone()));

        coordinator.migrate(&cancellation::never()).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.get("add default locale"), Some(&1));
        assert_eq!(calls.get("bump schema version"), Some(&1));
        assert_eq!(coordinator.count_applied().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn migrate_is_idempotent_on_rerun() {
        let store = store();
        let calls = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let coordinator = MigrationCoordinator::new(store.clone(), steps(calls.clone()));

        coordinator.migrate(&cancellation::never()).await.unwrap();
        coordinator.migrate(&cancellation::never()).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.get("add default locale"), Some(&1));
        assert_eq!(calls.get("bump schema version"), Some(&1));
    }

    #[tokio::test]
    async fn concurrent_migrate_calls_apply_each_step_exactly_once() {
        let store = store();
        let calls = Arc::new(std::sync::Mutex::new(HashMap::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let coordinator = MigrationCoordinator::new(store.clone(), steps(calls.clone()));
            handles.push(tokio::spawn(async move { coordinator.migrate(&cancellation::never()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let calls = calls.lock().unwrap();
        assert_eq!(calls.get("add default locale"), Some(&1));
        assert_eq!(calls.get("bump schema version"), Some(&1));

        let coordinator = MigrationCoordinator::new(store.clone(), steps(Arc::new(std::sync::Mutex::new(HashMap::new()))));
        assert_eq!(coordinator.count_applied().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn migrate_is_canceled_before_applying_any_step() {
        let store = store();
        let calls = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let coordinator = MigrationCoordinator::new(store, steps(calls.clone()));

        let (signal, canceled) = tokio::sync::watch::channel(true);
        drop(signal);
        let err = coordinator.migrate(&canceled).await.unwrap_err();

        assert_eq!(err.kind(), "Canceled");
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(coordinator.count_applied().await.unwrap(), 0);
    }
}
