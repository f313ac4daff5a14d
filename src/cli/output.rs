//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use console::{style, StyledObject};
use serde::Serialize;

use crate::domain::models::BuildStatus;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
        );
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Borderless list table with bold headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).add_attribute(Attribute::Bold)),
        );
    table
}

/// Build status colored for the terminal.
pub fn styled_status(status: BuildStatus) -> StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        BuildStatus::Success => style(text).green().bold(),
        BuildStatus::Running => style(text).yellow(),
        BuildStatus::Pending => style(text).blue(),
        BuildStatus::Failure | BuildStatus::Error => style(text).red().bold(),
        BuildStatus::Timeout => style(text).red(),
        BuildStatus::Stopped => style(text).dim(),
    }
}

/// Plain `{"message": ...}` output for verbs that only report text.
#[derive(Debug, Serialize)]
pub struct MessageOutput {
    pub message: String,
}

impl MessageOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl CommandOutput for MessageOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("kernel-flashable-sdm845", 10), "kernel-...");
        assert_eq!(truncate("ärger über", 6), "ärg...");
    }

    #[test]
    fn test_message_output_json() {
        let out = MessageOutput::new("Nothing to stop");
        assert_eq!(out.to_json()["message"], "Nothing to stop");
    }
}
