//! Flashable archive produced by a successful build.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A packaged `kernel-flashable-*.zip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Archive file name
    pub name: String,
    /// Location of the archive on disk
    pub path: PathBuf,
    /// Archive size in bytes
    pub size_bytes: u64,
    /// Kernel name the archive was built for
    pub kernel_name: String,
    pub created_at: DateTime<Local>,
}

impl Artifact {
    /// Human-readable size, e.g. `12.4 MB`.
    pub fn display_size(&self) -> String {
        format_size(self.size_bytes)
    }
}

/// Format a byte count using KB/MB with one decimal.
pub fn format_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{:.1} MB", kb / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
