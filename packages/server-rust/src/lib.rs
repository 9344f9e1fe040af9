//! `promise-server`: an HTTP host for the durable, at-least-once promise
//! execution subsystem -- document storage, the resilience pipeline, the
//! distributed momentary-lock factory, promise lifecycle and fulfillment,
//! background salvage, and forward-only schema migration.

pub mod cancellation;
pub mod error;
pub mod network;
pub mod service;
pub mod storage;

pub use error::{EngineError, EngineResult};
pub use network::{AppState, HealthState, HttpConfig, ShutdownController};
pub use service::{
    Action, ActionRegistry, MigrationCoordinator, MigrationStep, MomentaryLockFactory, Promise,
    PromiseEngineConfig, PromiseFulfiller, PromiseSalvager,
};
pub use storage::{Document, DocumentBackend, DocumentStore, DocumentStoreFactory};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
