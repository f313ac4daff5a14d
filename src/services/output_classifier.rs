//! Build output classifier.
//!
//! Scans build script output one line at a time and picks out the few markers the
//! supervisor cares about:
//!
//! - `Using kernel name: <name>` at the start of the trimmed line
//! - `Kernel image: <path>` at the start of the trimmed line
//! - `Applying patch` anywhere in the line (patching phase)
//! - `Building kernel` anywhere in the line (building phase)
//!
//! Markers are case-sensitive and values are split on the first colon only, so
//! values that contain colons survive intact. A repeated marker replaces the
//! earlier capture: the last announced name or path wins.

use crate::domain::models::PhaseEvent;

const KERNEL_NAME_MARKER: &str = "Using kernel name:";
const KERNEL_IMAGE_MARKER: &str = "Kernel image:";
const PATCHING_MARKER: &str = "Applying patch";
const BUILDING_MARKER: &str = "Building kernel";

/// Stateful scanner over build output lines.
#[derive(Debug, Clone, Default)]
pub struct OutputClassifier {
    kernel_name: Option<String>,
    image_path: Option<String>,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect one line, updating captures and returning the phase event it marks.
    ///
    /// A line marks at most one phase; patching is checked before building.
    pub fn observe(&mut self, line: &str) -> Option<PhaseEvent> {
        let trimmed = line.trim();

        if trimmed.starts_with(KERNEL_NAME_MARKER) {
            self.kernel_name = Some(value_after_colon(trimmed));
        }
        if trimmed.starts_with(KERNEL_IMAGE_MARKER) {
            self.image_path = Some(value_after_colon(trimmed));
        }

        if line.contains(PATCHING_MARKER) {
            Some(PhaseEvent::Patching)
        } else if line.contains(BUILDING_MARKER) {
            Some(PhaseEvent::Building)
        } else {
            None
        }
    }

    pub fn kernel_name(&self) -> Option<&str> {
        self.kernel_name.as_deref()
    }

    pub fn image_path(&self) -> Option<&str> {
        self.image_path.as_deref()
    }
}

fn value_after_colon(line: &str) -> String {
    line.split_once(':')
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}
