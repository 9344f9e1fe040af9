//! `promise-server` entry point: parses configuration, wires the document
//! store, action registry, and background salvager, then serves HTTP until
//! asked to shut down.

use std::sync::Arc;

use clap::Parser;
use promise_core::clock::SystemClock;

use promise_server::network::{build_app_state, NetworkHost};
use promise_server::service::registry::ActionRegistry;
use promise_server::service::{PromiseEngineConfig, PromiseSalvager};
use promise_server::storage::backends::NullBackend;
use promise_server::storage::factory::DocumentStoreFactory;

mod demo {
    pub use promise_server::network::handlers::example::{GreetEntityAction, GREET_ENTITY_ACTION};
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = PromiseEngineConfig::parse();

    let factory = DocumentStoreFactory::new(Arc::new(NullBackend), Arc::new(SystemClock));
    let store = factory.create();

    let registry = ActionRegistry::new();
    registry.register(demo::GREET_ENTITY_ACTION, Arc::new(demo::GreetEntityAction));

    let state = build_app_state(store.clone(), registry.clone(), Arc::new(config.http_config()));
    let host = NetworkHost::new(state.clone());
    let shutdown_controller = host.shutdown_controller();

    let salvager = Arc::new(PromiseSalvager::new(
        store,
        state.fulfiller.clone(),
        shutdown_controller.shutdown_receiver(),
        config.salvager_average_delay_secs,
        config.salvager_batch_size,
    ));
    let salvager_handle = tokio::spawn({
        let salvager = salvager.clone();
        async move { salvager.run().await }
    });

    let shutdown_timeout = config.shutdown_timeout();
    let signal_controller = shutdown_controller.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight requests");
        signal_controller.trigger_shutdown();
    });

    host.start().await?;

    shutdown_controller.wait_for_drain(shutdown_timeout).await;
    salvager_handle.await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();
}
