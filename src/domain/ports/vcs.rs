//! VCS port - interface for source-control metadata.

use async_trait::async_trait;

use crate::domain::models::VcsSnapshot;

/// Lookup of the current branch and commit of the project checkout.
#[async_trait]
pub trait VcsProvider: Send + Sync {
    /// Current position; fields are `unknown` when they cannot be determined.
    async fn snapshot(&self) -> VcsSnapshot;
}
