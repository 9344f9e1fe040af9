//! The cancellation-token primitive threaded through every suspension point
//! in the lock factory, migration coordinator, and transaction commit: a
//! plain `watch::Receiver<bool>` that flips to `true` once, the same
//! primitive [`crate::network::shutdown::ShutdownController`] already hands
//! out to the fulfiller and the salvager.

use tokio::sync::watch;

/// True if `token` already carries a cancellation signal. Checked at the
/// head of a retry loop, never awaited.
#[must_use]
pub fn is_canceled(token: &watch::Receiver<bool>) -> bool {
    *token.borrow()
}

/// Resolves once `token` carries `true`, or immediately if it already does.
/// Never resolves if the sender is dropped without ever signaling — in
/// practice the sender outlives every caller of this function.
pub async fn canceled(token: &watch::Receiver<bool>) {
    let mut rx = token.clone();
    if *rx.borrow() {
        return;
    }
    let _ = rx.changed().await;
}

/// A receiver that never fires, for a step that must run to completion
/// regardless of the outer cancellation signal — releasing an already-held
/// lock, or the fulfiller's post-success delete.
#[must_use]
pub fn never() -> watch::Receiver<bool> {
    watch::channel(false).1
}
