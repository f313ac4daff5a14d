//! Build run domain models.
//!
//! A [`BuildRun`] is one invocation of the external build script. Its [`LogId`] is
//! fixed at creation and ties together the build log, the packaged archive and any
//! later "build info" lookup.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::artifact::Artifact;
use crate::domain::errors::{BuildError, BuildResult};

const LOG_ID_PREFIX: &str = "build_";
const LOG_EXTENSION: &str = ".log";

/// Timestamp-derived identifier of a build run, e.g. `build_20250101_120000`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(String);

impl LogId {
    /// Identifier for a build started at `at`.
    pub fn at(at: DateTime<Local>) -> Self {
        Self(format!("{LOG_ID_PREFIX}{}", at.format("%Y%m%d_%H%M%S")))
    }

    /// Parse an identifier from either `build_X` or the log file name `build_X.log`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let id = raw.strip_suffix(LOG_EXTENSION).unwrap_or(raw);
        let stamp = id.strip_prefix(LOG_ID_PREFIX)?;
        if stamp.is_empty() || stamp.contains(['/', '\\']) {
            return None;
        }
        Some(Self(id.to_string()))
    }

    /// Whether a directory entry name looks like a build log.
    pub fn is_log_file_name(name: &str) -> bool {
        name.starts_with(LOG_ID_PREFIX) && name.ends_with(LOG_EXTENSION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the log file backing this run.
    pub fn file_name(&self) -> String {
        format!("{}{LOG_EXTENSION}", self.0)
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source-control position captured when a build starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsSnapshot {
    pub branch: String,
    pub commit: String,
}

impl VcsSnapshot {
    pub fn new(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            commit: commit.into(),
        }
    }

    /// Snapshot used when no repository information is available.
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown")
    }
}

impl Default for VcsSnapshot {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Phase transitions detected in the build output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    Patching,
    Building,
}

impl PhaseEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patching => "patching",
            Self::Building => "building",
        }
    }

    /// Short text pushed to the status display.
    pub fn display_text(&self) -> &'static str {
        match self {
            Self::Patching => "Patching...",
            Self::Building => "Building...",
        }
    }
}

/// Status of a build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Created, process not launched yet
    Pending,
    /// Process running and output being pumped
    Running,
    /// Process exited with code 0
    Success,
    /// Process exited with a nonzero code or by signal
    Failure,
    /// Wall-clock ceiling exceeded
    Timeout,
    /// Launch, read or log I/O failure
    Error,
    /// Stopped by the operator
    Stopped,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "timeout" => Some(Self::Timeout),
            "error" => Some(Self::Error),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Error),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of the external build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRun {
    pub log_id: LogId,
    pub requester: String,
    pub vcs: VcsSnapshot,
    pub status: BuildStatus,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub exit_code: Option<i32>,
    /// Kernel name announced by the build (`Using kernel name:`)
    pub kernel_name: Option<String>,
    /// Kernel image path announced by the build (`Kernel image:`)
    pub image_path: Option<String>,
    /// Phase events in the order they were seen
    pub phases: Vec<PhaseEvent>,
    /// Output lines captured into the build log
    pub lines_captured: usize,
    pub artifact: Option<Artifact>,
    pub error: Option<String>,
}

impl BuildRun {
    pub fn new(log_id: LogId, requester: impl Into<String>, vcs: VcsSnapshot, started_at: DateTime<Local>) -> Self {
        Self {
            log_id,
            requester: requester.into(),
            vcs,
            status: BuildStatus::Pending,
            started_at,
            finished_at: None,
            exit_code: None,
            kernel_name: None,
            image_path: None,
            phases: vec![],
            lines_captured: 0,
            artifact: None,
            error: None,
        }
    }

    pub fn start(&mut self) -> BuildResult<()> {
        self.transition_to(BuildStatus::Running)
    }

    /// Move to a terminal status and stamp the end time.
    pub fn finish(&mut self, status: BuildStatus) -> BuildResult<()> {
        if !status.is_terminal() {
            return Err(BuildError::InvalidStateTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.transition_to(status)?;
        self.finished_at = Some(Local::now());
        Ok(())
    }

    /// Finish with an error description attached.
    pub fn fail(&mut self, status: BuildStatus, error: impl Into<String>) -> BuildResult<()> {
        self.finish(status)?;
        self.error = Some(error.into());
        Ok(())
    }

    fn transition_to(&mut self, next: BuildStatus) -> BuildResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(BuildError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn count_phase(&self, phase: PhaseEvent) -> usize {
        self.phases.iter().filter(|p| **p == phase).count()
    }

    /// Wall-clock duration of the run so far (or in total once finished).
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Local::now) - self.started_at
    }
}
