//! Common test utilities for integration tests
//!
//! Provides a throwaway build workspace (script, template, log and artifact
//! directories) plus recording fakes for the notifier and reporter ports.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use kernelwatch::domain::models::Config;
use kernelwatch::{BuildReporter, BuildResult, BuildSupervisor, StatusNotifier};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Notifier that remembers every message it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusNotifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> bool {
        self.messages.lock().unwrap().push(message.to_string());
        true
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}

/// Reporter that remembers messages and documents.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<String>>,
    documents: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<(PathBuf, String)> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildReporter for RecordingReporter {
    async fn send_message(&self, text: &str) -> BuildResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_document(&self, path: &Path, caption: &str) -> BuildResult<()> {
        self.documents
            .lock()
            .unwrap()
            .push((path.to_path_buf(), caption.to_string()));
        Ok(())
    }
}

/// Isolated project directory with a `/bin/sh` build script.
pub struct BuildFixture {
    pub dir: TempDir,
    pub config: Config,
}

impl BuildFixture {
    /// Workspace whose build runs `script` with `/bin/sh` inside the project directory.
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path();

        let script_path = root.join("build.sh");
        std::fs::write(&script_path, script).unwrap();

        let template = root.join("AnyKernel3");
        std::fs::create_dir_all(template.join("tools")).unwrap();
        std::fs::write(template.join("anykernel.sh"), "# flash script\n").unwrap();
        std::fs::write(template.join("tools/busybox"), "binary").unwrap();

        let mut config = Config::default();
        config.build.script = PathBuf::from("/bin/sh");
        config.build.args = vec![script_path.display().to_string()];
        config.build.project_dir = root.to_path_buf();
        config.build.timeout_secs = 30;
        config.build.stop_grace_secs = 2;
        config.artifacts.dir = root.join("artifacts");
        config.artifacts.template_dir = template;
        config.logs.dir = root.join("logs");

        Self { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn supervisor(&self) -> (Arc<BuildSupervisor>, Arc<RecordingNotifier>, Arc<RecordingReporter>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = Arc::new(RecordingReporter::default());
        let supervisor = Arc::new(BuildSupervisor::new(
            &self.config,
            Arc::clone(&notifier) as Arc<dyn StatusNotifier>,
            Arc::clone(&reporter) as Arc<dyn BuildReporter>,
        ));
        (supervisor, notifier, reporter)
    }
}

/// Poll `predicate` every 20ms until it holds or `timeout` passes.
pub async fn wait_until<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}
