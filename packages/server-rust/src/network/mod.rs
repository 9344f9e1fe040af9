//! HTTP front end: configuration, handlers, and graceful shutdown.

pub mod config;
pub mod handlers;
pub mod server;
pub mod shutdown;

pub use config::HttpConfig;
pub use handlers::AppState;
pub use server::{build_app_state, NetworkHost};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
