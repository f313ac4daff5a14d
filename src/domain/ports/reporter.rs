//! Build reporter port - interface for the operator channel.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::errors::BuildResult;

/// Channel carrying build results back to the operator who asked for them.
#[async_trait]
pub trait BuildReporter: Send + Sync {
    /// Send a short status message.
    async fn send_message(&self, text: &str) -> BuildResult<()>;

    /// Send a file (build log or archive) as a downloadable document.
    async fn send_document(&self, path: &Path, caption: &str) -> BuildResult<()>;
}
