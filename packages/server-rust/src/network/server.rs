//! Deferred-startup HTTP server assembly: builds the router and middleware
//! stack up front, then binds and serves only once [`NetworkHost::start`] is
//! called, so a caller can run other startup work (migrations, warmup) in
//! between construction and accepting traffic.

use std::sync::Arc;
use std::time::Instant;

use axum::http::header::HeaderName;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::network::handlers::{add_entities_handler, health_handler, liveness_handler, readiness_handler};
use crate::network::{AppState, HttpConfig, ShutdownController};
use crate::service::fulfiller::PromiseFulfiller;
use crate::service::registry::ActionRegistry;
use crate::storage::store::DocumentStore;

/// Builds the shared [`AppState`] for a fresh host, in the `Starting` health
/// state (callers flip it to `Ready` once background tasks, e.g. the
/// salvager, are spawned).
#[must_use]
pub fn build_app_state(
    store: DocumentStore,
    registry: ActionRegistry,
    config: Arc<HttpConfig>,
) -> AppState {
    let fulfiller = PromiseFulfiller::new(store.clone(), registry.clone());
    AppState {
        store,
        registry,
        fulfiller,
        shutdown: Arc::new(ShutdownController::new()),
        config,
        start_time: Instant::now(),
    }
}

/// Deferred-startup HTTP host: constructed with its router already built,
/// bound to a socket only once [`start`](Self::start) is called.
pub struct NetworkHost {
    router: Router,
    state: AppState,
}

impl NetworkHost {
    /// Builds the router and middleware stack over `state`. Does not bind a
    /// socket yet.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        let router = Router::new()
            .route("/healthz", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/example/add-entities", post(add_entities_handler))
            .layer(build_http_layers(&state.config))
            .with_state(state.clone());
        Self { router, state }
    }

    /// The shutdown controller backing this host, for callers that need to
    /// trigger shutdown or wait for drain from outside the serve loop.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.state.shutdown.clone()
    }

    /// Binds `host:port` and serves until `shutdown_signal` fires, then
    /// waits for in-flight requests to drain.
    ///
    /// Consumes `self`: once bound, the router can't be rebuilt under the
    /// same host.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "promise-server listening");

        self.state.shutdown.set_ready();
        let mut shutdown_signal = self.state.shutdown.shutdown_receiver();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_signal.changed().await;
            })
            .await?;

        Ok(())
    }
}

/// The composed Tower middleware stack applied to every request, outermost
/// first: request-id assignment, tracing, CORS, timeout, request-id
/// propagation back onto the response.
fn build_http_layers(
    config: &HttpConfig,
) -> tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            CorsLayer,
            tower::layer::util::Stack<
                TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>,
                tower::layer::util::Stack<SetRequestIdLayer<MakeRequestUuid>, tower::layer::util::Identity>,
            >,
        >,
    >,
> {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// A wildcard `"*"` allows any origin; otherwise each entry is parsed as an
/// explicit allowed origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()).collect::<Vec<_>>())
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
