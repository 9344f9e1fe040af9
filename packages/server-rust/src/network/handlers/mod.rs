//! HTTP handler definitions and the shared state they're built over.

pub mod example;
pub mod health;

pub use example::add_entities_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use crate::network::{HttpConfig, ShutdownController};
use crate::service::fulfiller::PromiseFulfiller;
use crate::service::registry::ActionRegistry;
use crate::storage::store::DocumentStore;

/// Shared application state passed to every axum handler via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    /// The document store every use case reads and writes through.
    pub store: DocumentStore,
    /// Registered fulfillment handlers.
    pub registry: ActionRegistry,
    /// Executes a promise's action and deletes it on success.
    pub fulfiller: PromiseFulfiller,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// HTTP-facing configuration (bind address, CORS, timeouts).
    pub config: Arc<HttpConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
