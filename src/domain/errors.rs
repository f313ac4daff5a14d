//! Domain errors for the kernelwatch build supervisor.

use std::io;

use thiserror::Error;

/// Errors that can occur while supervising a kernel build.
///
/// Only `AlreadyRunning` ever escapes [`BuildSupervisor::start_build`]; every other
/// variant is either turned into a terminal run status or downgraded to a warning
/// at the point where it happens.
///
/// [`BuildSupervisor::start_build`]: crate::services::BuildSupervisor::start_build
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("A build is already running: {0}")]
    AlreadyRunning(String),

    #[error("Failed to launch build process {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read build output: {0}")]
    StreamRead(#[source] io::Error),

    #[error("Build exceeded the {0}s time limit")]
    Timeout(u64),

    #[error("Build process exited with {}", format_exit_code(*.0))]
    ProcessFailure(Option<i32>),

    #[error("Packaging failed: {0}")]
    Packaging(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Log retention failed: {0}")]
    Retention(String),

    #[error("Build log I/O error: {0}")]
    LogIo(#[from] io::Error),

    #[error("Failed to deliver report: {0}")]
    Report(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

fn format_exit_code(code: Option<i32>) -> String {
    code.map_or_else(|| "no exit code (killed by signal)".to_string(), |c| format!("code {c}"))
}

pub type BuildResult<T> = Result<T, BuildError>;
