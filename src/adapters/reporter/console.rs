//! Reporter that writes operator messages to the terminal.
//!
//! Documents cannot be uploaded from a terminal, so they are announced by path
//! (with their size) instead.

use std::path::Path;

use async_trait::async_trait;
use console::style;
use serde_json::json;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::format_size;
use crate::domain::ports::BuildReporter;

/// Prints messages and document references to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    json: bool,
    quiet: bool,
}

impl ConsoleReporter {
    /// `json` switches to one JSON object per line.
    pub const fn new(json: bool) -> Self {
        Self { json, quiet: false }
    }

    /// Reporter that only validates documents and prints nothing.
    pub const fn quiet() -> Self {
        Self {
            json: false,
            quiet: true,
        }
    }
}

#[async_trait]
impl BuildReporter for ConsoleReporter {
    async fn send_message(&self, text: &str) -> BuildResult<()> {
        if self.quiet {
            return Ok(());
        }
        if self.json {
            println!("{}", json!({ "type": "message", "text": text }));
        } else {
            println!("{} {text}", style("»").cyan().bold());
        }
        Ok(())
    }

    async fn send_document(&self, path: &Path, caption: &str) -> BuildResult<()> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| BuildError::Report(format!("{}: {e}", path.display())))?
            .len();

        if self.quiet {
            return Ok(());
        }
        if self.json {
            println!(
                "{}",
                json!({
                    "type": "document",
                    "caption": caption,
                    "path": path.display().to_string(),
                    "size_bytes": size,
                })
            );
        } else {
            println!(
                "{} {caption}\n  {} ({})",
                style("📎").bold(),
                style(path.display()).underlined(),
                style(format_size(size)).dim()
            );
        }
        Ok(())
    }
}
