//! Status notifier port - interface for the remote status display.

use async_trait::async_trait;

/// Sink for short status strings shown on the remote display.
///
/// Implementations never fail: transport errors are retried and logged
/// internally, and the outcome is reported as a plain `bool`.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    /// Push `message` to the display. Returns `true` once acknowledged
    /// (or immediately when notifications are disabled).
    async fn notify(&self, message: &str) -> bool;

    /// Check whether the display answers at all.
    async fn is_reachable(&self) -> bool;
}
