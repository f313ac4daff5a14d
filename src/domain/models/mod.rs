pub mod artifact;
pub mod build_run;
pub mod config;

pub use artifact::{format_size, Artifact};
pub use build_run::{BuildRun, BuildStatus, LogId, PhaseEvent, VcsSnapshot};
pub use config::{
    ArtifactsConfig, BuildConfig, BuildLogConfig, Config, LoggingConfig, NotifierConfig,
};
