//! Coordinates graceful shutdown across the HTTP front and the background
//! salvager: a shared health state for readiness probes, a `watch` channel
//! both listeners select on, and an in-flight counter so `wait_for_drain`
//! knows when it's actually safe to stop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Health state reported at `/healthz` and consulted by request middleware.
///
/// Transitions only move forward: `Starting -> Ready -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Not yet accepting traffic — still wiring up the store/registry/salvager.
    Starting,
    /// Accepting requests normally.
    Ready,
    /// Shutdown has been triggered; no new requests should be accepted, but
    /// in-flight ones are still being allowed to finish.
    Draining,
    /// Every in-flight request (and the salvager's current iteration) has
    /// finished.
    Stopped,
}

impl HealthState {
    /// Lower-case name used in the health endpoint's JSON body.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Shared shutdown/health coordination point for a running `promise-server`
/// process.
///
/// `main` flips this to `Ready` once the HTTP listener is bound and the
/// salvager is spawned; a `ctrl_c` handler calls [`trigger_shutdown`], and
/// both the salvager's drain loop and `axum::serve`'s graceful-shutdown
/// future select on [`shutdown_receiver`] to stop taking new work.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state, no shutdown triggered.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    /// Moves to `Ready`. Called once startup work (store wiring, migrations,
    /// spawning the salvager) is done.
    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// A receiver that flips to `true` when [`trigger_shutdown`] is called.
    /// Every independent listener (HTTP server, salvager) gets its own
    /// receiver via this method rather than sharing one.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves to `Draining` and wakes every outstanding `shutdown_receiver`.
    /// Idempotent: calling it twice just re-sends `true`.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        let _ = self.shutdown_signal.send(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// A cloneable handle onto the health state, for a handler that wants to
    /// read it without holding a reference to the whole controller.
    #[must_use]
    pub fn health_state_handle(&self) -> Arc<ArcSwap<HealthState>> {
        Arc::clone(&self.health_state)
    }

    /// Marks one in-flight unit of work (an HTTP request, a salvager drain
    /// iteration) as started. The returned guard marks it finished on drop,
    /// including on panic, so a count never leaks.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Polls the in-flight count until it reaches zero or `timeout` elapses.
    /// Moves to `Stopped` and returns `true` on a clean drain; on timeout,
    /// leaves the state at `Draining` and returns `false` so the caller can
    /// decide whether to force an exit.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.in_flight.load(Ordering::Relaxed) == 0 {
                self.health_state.store(Arc::new(HealthState::Stopped));
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                return false;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the controller's in-flight count on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
