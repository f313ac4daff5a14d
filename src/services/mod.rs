//! Build supervision services.

pub mod artifact_packager;
pub mod build_supervisor;
pub mod exclusivity;
pub mod log_store;
pub mod output_classifier;

pub use artifact_packager::ArtifactPackager;
pub use build_supervisor::{BuildSupervisor, StopOutcome, SupervisorStatus, BUILD_OUTPUT_TARGET};
pub use exclusivity::{ExclusivitySlot, ExclusivityToken, SlotGuard};
pub use log_store::{BuildLog, BuildLogInfo, LogEntry, LogStore, TrimReport};
pub use output_classifier::OutputClassifier;
