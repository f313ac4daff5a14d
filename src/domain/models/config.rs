use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for kernelwatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// External build process configuration
    #[serde(default)]
    pub build: BuildConfig,

    /// Flashable archive packaging configuration
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Build log storage and retention
    #[serde(default)]
    pub logs: BuildLogConfig,

    /// Remote status display configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Operational logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External build process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildConfig {
    /// Build executable, resolved relative to `project_dir` when not absolute
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Arguments passed to the build executable
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory of the build
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// Wall-clock ceiling for a single build, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long a stopped build gets to exit after SIGTERM before it is killed
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

fn default_script() -> PathBuf {
    PathBuf::from("./build.sh")
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_timeout_secs() -> u64 {
    1800
}

const fn default_stop_grace_secs() -> u64 {
    10
}

impl BuildConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub const fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            script: default_script(),
            args: vec![],
            project_dir: default_project_dir(),
            timeout_secs: default_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

/// Flashable archive packaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactsConfig {
    /// Directory receiving finished archives
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,

    /// Archive skeleton copied into every package
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// File name the kernel image gets inside the skeleton
    #[serde(default = "default_image_file_name")]
    pub image_file_name: String,

    /// Image used when the build output does not name an existing one
    #[serde(default = "default_fallback_image")]
    pub fallback_image: PathBuf,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("AnyKernel3")
}

fn default_image_file_name() -> String {
    "Image.gz".to_string()
}

fn default_fallback_image() -> PathBuf {
    PathBuf::from("out/arch/arm64/boot/Image.gz")
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            template_dir: default_template_dir(),
            image_file_name: default_image_file_name(),
            fallback_image: default_fallback_image(),
        }
    }
}

/// Build log storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildLogConfig {
    /// Directory holding `build_*.log` files
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,

    /// Number of most recent build logs kept by retention trimming
    #[serde(default = "default_retain")]
    pub retain: usize,

    /// Number of logs shown by a listing
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

const fn default_retain() -> usize {
    10
}

const fn default_list_limit() -> usize {
    5
}

impl Default for BuildLogConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
            retain: default_retain(),
            list_limit: default_list_limit(),
        }
    }
}

/// Remote status display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotifierConfig {
    /// Send status updates to the display
    #[serde(default)]
    pub enabled: bool,

    /// Display address (`host` or `host:port`)
    #[serde(default)]
    pub address: String,

    /// Per-attempt request timeout in seconds
    #[serde(default = "default_notifier_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per notification
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

const fn default_notifier_timeout_secs() -> u64 {
    5
}

const fn default_max_attempts() -> u32 {
    3
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: String::new(),
            timeout_secs: default_notifier_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for the operational log file (stdout only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
