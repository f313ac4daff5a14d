//! Integration tests for the build supervisor
//!
//! Every test drives a real `/bin/sh` build script through the supervisor in an
//! isolated workspace and checks the run, the build log, the archive and what
//! was pushed to the notifier and reporter.
//!
//! Test coverage:
//! - Successful build with packaging
//! - Nonzero exit, stdout/stderr merged in write order
//! - Exclusivity (second start rejected) and stop handling
//! - Wall-clock timeout, launch failure, packaging failure
//! - Log retention after each run
#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{setup_test_logging, wait_until, BuildFixture};
use kernelwatch::services::log_store::{HEADER_LINES, TRAILER_LINES};
use kernelwatch::{BuildError, BuildStatus, PhaseEvent, StopOutcome, VcsSnapshot};

const SUCCESS_SCRIPT: &str = r#"
echo "Applying patch foo"
echo "Using kernel name: sdm845"
mkdir -p out && printf 'kernel-bytes' > out/Image.gz
echo "Kernel image: out/Image.gz"
echo "done"
"#;

fn vcs() -> VcsSnapshot {
    VcsSnapshot::new("main", "1a2b3c4")
}

fn log_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_successful_build_is_packaged_and_reported() {
    setup_test_logging();
    let fixture = BuildFixture::new(SUCCESS_SCRIPT);
    let (supervisor, notifier, reporter) = fixture.supervisor();

    let run = supervisor.start_build("tester", vcs()).await.unwrap();

    assert_eq!(run.status, BuildStatus::Success);
    assert_eq!(run.exit_code, Some(0));
    assert_eq!(run.kernel_name.as_deref(), Some("sdm845"));
    assert_eq!(run.image_path.as_deref(), Some("out/Image.gz"));
    assert_eq!(run.phases, vec![PhaseEvent::Patching]);
    assert_eq!(run.lines_captured, 4);
    assert!(run.finished_at.is_some());

    let artifact = run.artifact.clone().expect("archive should be produced");
    assert!(artifact.name.starts_with("kernel-flashable-sdm845_"));
    assert!(artifact.path.is_file());
    assert_eq!(artifact.path.parent(), Some(fixture.config.artifacts.dir.as_path()));

    let log_path = supervisor.log_store().path_for(&run.log_id);
    let lines = log_lines(&log_path);
    assert_eq!(lines.len(), HEADER_LINES + 4 + TRAILER_LINES);
    assert_eq!(lines[0], "# requester: tester");
    assert_eq!(lines[1], "# branch: main");
    assert_eq!(lines[2], "# commit: 1a2b3c4");
    assert_eq!(lines[HEADER_LINES], "Applying patch foo");
    assert!(lines.last().unwrap().ends_with("status: success"));

    let notifications = notifier.messages();
    assert_eq!(
        notifications,
        vec!["Build Started", "Patching...", "Build Success"]
    );

    let documents = reporter.documents();
    assert_eq!(documents.len(), 2, "archive and log: {documents:?}");
    assert_eq!(documents[0].0, artifact.path);
    assert_eq!(documents[1].0, log_path);

    assert!(!supervisor.is_building());
    let status = supervisor.status();
    assert!(status.active.is_none());
    assert_eq!(status.last.unwrap().log_id, run.log_id);
}

#[tokio::test]
async fn test_failed_build_sends_log_without_archive() {
    let fixture = BuildFixture::new("echo one\necho two\necho three\nexit 1\n");
    let (supervisor, notifier, reporter) = fixture.supervisor();

    let run = supervisor.start_build("tester", vcs()).await.unwrap();

    assert_eq!(run.status, BuildStatus::Failure);
    assert_eq!(run.exit_code, Some(1));
    assert!(run.artifact.is_none());
    assert!(run.error.as_deref().unwrap().contains("code 1"));
    assert!(!fixture.config.artifacts.dir.exists());

    let lines = log_lines(&supervisor.log_store().path_for(&run.log_id));
    assert_eq!(lines.len(), HEADER_LINES + 3 + TRAILER_LINES);
    assert_eq!(&lines[HEADER_LINES..HEADER_LINES + 3], ["one", "two", "three"]);
    assert!(lines.last().unwrap().ends_with("status: failure"));

    assert!(notifier.messages().contains(&"Build Failed".to_string()));
    let documents = reporter.documents();
    assert_eq!(documents.len(), 1);
    assert!(documents[0].1.contains("failure"));
    assert!(reporter
        .messages()
        .iter()
        .any(|m| m.starts_with("Build failed")));
}

#[tokio::test]
async fn test_stdout_and_stderr_keep_write_order() {
    let fixture = BuildFixture::new(
        r#"
i=0
while [ $i -lt 300 ]; do
    echo "out-$i"
    echo "err-$i" 1>&2
    i=$((i + 1))
done
"#,
    );
    let (supervisor, _notifier, _reporter) = fixture.supervisor();

    let run = supervisor.start_build("tester", vcs()).await.unwrap();
    assert_eq!(run.status, BuildStatus::Success);
    assert_eq!(run.lines_captured, 600);

    let expected: Vec<String> = (0..300)
        .flat_map(|i| [format!("out-{i}"), format!("err-{i}")])
        .collect();
    let lines = log_lines(&supervisor.log_store().path_for(&run.log_id));
    assert_eq!(&lines[HEADER_LINES..HEADER_LINES + 600], expected.as_slice());
}

#[tokio::test]
async fn test_classifier_sees_markers_across_streams_in_order() {
    let fixture = BuildFixture::new(
        "echo \"Using kernel name: first\"\necho \"Using kernel name: second\" 1>&2\necho \"Kernel image: err.img\" 1>&2\necho \"Kernel image: out.img\"\n",
    );
    let (supervisor, _notifier, _reporter) = fixture.supervisor();

    let run = supervisor.start_build("tester", vcs()).await.unwrap();

    assert_eq!(run.kernel_name.as_deref(), Some("second"));
    assert_eq!(run.image_path.as_deref(), Some("out.img"));
}

#[tokio::test]
async fn test_second_build_is_rejected_while_running() {
    let fixture = BuildFixture::new("echo started\nsleep 30\n");
    let (supervisor, _notifier, reporter) = fixture.supervisor();

    let first = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.start_build("first", vcs()).await })
    };
    assert!(
        wait_until(
            || supervisor.status().active.is_some_and(|r| r.lines_captured >= 1),
            Duration::from_secs(10)
        )
        .await
    );

    let active_id = supervisor.status().active.unwrap().log_id;
    match supervisor.start_build("second", vcs()).await {
        Err(BuildError::AlreadyRunning(id)) => assert_eq!(id, active_id.to_string()),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert!(reporter
        .messages()
        .iter()
        .any(|m| m.contains("already running") && m.contains(active_id.as_str())));

    assert_eq!(
        supervisor.stop_build().await,
        StopOutcome::Stopped {
            log_id: active_id.clone()
        }
    );
    let run = first.await.unwrap().unwrap();
    assert_eq!(run.status, BuildStatus::Stopped);
    assert_eq!(run.requester, "first");
}

#[tokio::test]
async fn test_stop_without_build_is_idempotent() {
    let fixture = BuildFixture::new("echo unused\n");
    let (supervisor, notifier, _reporter) = fixture.supervisor();

    assert_eq!(supervisor.stop_build().await, StopOutcome::NothingToStop);
    assert_eq!(supervisor.stop_build().await, StopOutcome::NothingToStop);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_stop_terminates_the_whole_process_group() {
    let fixture = BuildFixture::new("echo \"Building kernel now\"\nsleep 60 &\nsleep 60\n");
    let (supervisor, notifier, reporter) = fixture.supervisor();

    let handle = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.start_build("tester", vcs()).await })
    };
    assert!(
        wait_until(
            || supervisor.status().active.is_some_and(|r| r.lines_captured >= 1),
            Duration::from_secs(10)
        )
        .await
    );

    let started = Instant::now();
    assert!(matches!(
        supervisor.stop_build().await,
        StopOutcome::Stopped { .. }
    ));
    assert!(started.elapsed() < Duration::from_secs(10));

    let run = handle.await.unwrap().unwrap();
    assert_eq!(run.status, BuildStatus::Stopped);
    assert_eq!(run.phases, vec![PhaseEvent::Building]);
    assert!(!supervisor.is_building());

    let lines = log_lines(&supervisor.log_store().path_for(&run.log_id));
    assert!(lines.last().unwrap().ends_with("status: stopped"));

    let notifications = notifier.messages();
    assert!(notifications.contains(&"Building...".to_string()));
    assert_eq!(notifications.last().map(String::as_str), Some("Build Stopped"));
    assert!(reporter.documents()[0].1.contains("stopped"));

    // A stop after the run is finalized finds nothing.
    assert_eq!(supervisor.stop_build().await, StopOutcome::NothingToStop);
}

#[tokio::test]
async fn test_timeout_bounds_a_silent_build() {
    let mut fixture = BuildFixture::new("echo begin\nsleep 60\n");
    fixture.config.build.timeout_secs = 1;
    let (supervisor, notifier, reporter) = fixture.supervisor();

    let started = Instant::now();
    let run = supervisor.start_build("tester", vcs()).await.unwrap();

    assert_eq!(run.status, BuildStatus::Timeout);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(run.error.as_deref().unwrap().contains("1s"));
    assert!(run.artifact.is_none());

    let lines = log_lines(&supervisor.log_store().path_for(&run.log_id));
    assert!(lines.contains(&"begin".to_string()));
    assert!(lines.last().unwrap().ends_with("status: timeout"));

    assert!(notifier.messages().contains(&"Timeout Error".to_string()));
    assert!(reporter.messages().iter().any(|m| m.contains("timed out")));
    assert_eq!(reporter.documents().len(), 1);
    assert!(!supervisor.is_building());
}

#[tokio::test]
async fn test_launch_failure_is_an_error_run() {
    let mut fixture = BuildFixture::new("echo unused\n");
    fixture.config.build.script = PathBuf::from("/nonexistent/kernel/build.sh");
    fixture.config.build.args.clear();
    let (supervisor, notifier, reporter) = fixture.supervisor();

    let run = supervisor.start_build("tester", vcs()).await.unwrap();

    assert_eq!(run.status, BuildStatus::Error);
    assert!(run.error.as_deref().unwrap().contains("Failed to launch"));
    assert!(!supervisor.is_building());
    assert!(notifier.messages().contains(&"Critical Error".to_string()));
    assert!(reporter
        .messages()
        .iter()
        .any(|m| m.starts_with("Critical build error")));

    let lines = log_lines(&supervisor.log_store().path_for(&run.log_id));
    assert_eq!(lines.len(), HEADER_LINES + TRAILER_LINES);
    assert!(lines.last().unwrap().ends_with("status: error"));
}

#[tokio::test]
async fn test_missing_image_keeps_success_without_archive() {
    let fixture = BuildFixture::new("echo \"Using kernel name: ghost\"\n");
    let (supervisor, notifier, reporter) = fixture.supervisor();

    let run = supervisor.start_build("tester", vcs()).await.unwrap();

    assert_eq!(run.status, BuildStatus::Success);
    assert!(run.artifact.is_none());
    assert!(notifier.messages().contains(&"Build Success".to_string()));
    assert!(reporter
        .messages()
        .iter()
        .any(|m| m.contains("no archive was produced")));
    assert_eq!(reporter.documents().len(), 1, "only the log is sent");
}

#[tokio::test]
async fn test_fallback_image_is_packaged() {
    let fixture = BuildFixture::new(
        "mkdir -p out/arch/arm64/boot\nprintf 'img' > out/arch/arm64/boot/Image.gz\necho built\n",
    );
    let (supervisor, _notifier, _reporter) = fixture.supervisor();

    let run = supervisor.start_build("tester", vcs()).await.unwrap();

    let artifact = run.artifact.expect("fallback image should be packaged");
    assert!(artifact.name.starts_with("kernel-flashable-unknown_"));
}

#[tokio::test]
async fn test_retention_runs_after_every_build() {
    let mut fixture = BuildFixture::new("echo quick\n");
    fixture.config.logs.retain = 2;
    let (supervisor, _notifier, _reporter) = fixture.supervisor();

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(supervisor.start_build("tester", vcs()).await.unwrap().log_id);
    }

    let stored = supervisor.log_store().list().await.unwrap();
    assert_eq!(stored.len(), 2);
    let mut unique = ids.clone();
    unique.dedup();
    assert_eq!(unique.len(), 3, "every run gets its own log: {ids:?}");
}

#[tokio::test]
async fn test_live_status_tracks_classifier() {
    let fixture = BuildFixture::new("echo \"Using kernel name: live\"\nsleep 30\n");
    let (supervisor, _notifier, _reporter) = fixture.supervisor();

    let handle = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.start_build("watcher", vcs()).await })
    };

    assert!(
        wait_until(
            || {
                supervisor
                    .status()
                    .active
                    .is_some_and(|r| r.kernel_name.as_deref() == Some("live"))
            },
            Duration::from_secs(10)
        )
        .await
    );
    let active = supervisor.status().active.unwrap();
    assert_eq!(active.status, BuildStatus::Running);
    assert_eq!(active.requester, "watcher");

    supervisor.stop_build().await;
    let run = handle.await.unwrap().unwrap();
    assert_eq!(run.kernel_name.as_deref(), Some("live"));
}

#[tokio::test]
async fn test_request_shutdown_signals_front_end() {
    let fixture = BuildFixture::new("echo unused\n");
    let (supervisor, _notifier, _reporter) = fixture.supervisor();
    let mut signal = supervisor.shutdown_signal();

    assert_eq!(supervisor.request_shutdown().await, StopOutcome::NothingToStop);
    signal.changed().await.unwrap();
    assert!(*signal.borrow());
}
