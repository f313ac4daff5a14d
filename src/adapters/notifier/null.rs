//! Notifier that drops everything.

use async_trait::async_trait;

use crate::domain::ports::StatusNotifier;

/// Used when no status display is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl StatusNotifier for NullNotifier {
    async fn notify(&self, _message: &str) -> bool {
        true
    }

    async fn is_reachable(&self) -> bool {
        false
    }
}
