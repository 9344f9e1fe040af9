//! Use-case layer: promise lifecycle, the resilience pipeline, the
//! distributed lock factory, background salvage, schema migration, and the
//! action registry they all share.

pub mod config;
pub mod fulfiller;
pub mod locks;
pub mod migration;
pub mod promise;
pub mod registry;
pub mod resilience;
pub mod salvager;

pub use config::PromiseEngineConfig;
pub use fulfiller::PromiseFulfiller;
pub use locks::{CompositeLock, Lock, MomentaryLockFactory};
pub use migration::{MigrationCoordinator, MigrationStep};
pub use promise::{Promise, CLAIM_DURATION_SECONDS};
pub use registry::{Action, ActionRegistry};
pub use resilience::resilient;
pub use salvager::{PromiseSalvager, SalvagerState};
