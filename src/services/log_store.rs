//! Build log storage and retention.
//!
//! Every build run writes one `build_{YYYYMMDD_HHMMSS}.log` file:
//!
//! ```text
//! # requester: alice
//! # branch: main
//! # commit: 1a2b3c4
//! # started: 2025-03-09T14:05:07+01:00
//! <build output, one line per captured line>
//! # finished: 2025-03-09T14:31:40+01:00 status: success
//! ```
//!
//! Retention keeps the newest `retain` logs by file name (names sort by start time)
//! and deletes the rest.

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{BuildRun, BuildStatus, LogId};
use crate::services::output_classifier::OutputClassifier;

const REQUESTER_KEY: &str = "# requester:";
const BRANCH_KEY: &str = "# branch:";
const COMMIT_KEY: &str = "# commit:";
const STARTED_KEY: &str = "# started:";
const FINISHED_KEY: &str = "# finished:";
const STATUS_KEY: &str = " status:";

/// Number of header lines written before the build output.
pub const HEADER_LINES: usize = 4;
/// Number of trailer lines written after the build output.
pub const TRAILER_LINES: usize = 1;

/// Directory of build logs.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    retain: usize,
}

/// A stored build log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub log_id: LogId,
    pub file_name: String,
    pub size_bytes: u64,
}

/// Result of a retention pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrimReport {
    /// Logs present before trimming
    pub total: usize,
    /// Configured number of logs to keep
    pub retain: usize,
    /// File names removed
    pub deleted: Vec<String>,
    /// Deletions that failed
    pub failed: usize,
}

/// Everything recoverable about a finished (or interrupted) build from its log.
#[derive(Debug, Clone, Serialize)]
pub struct BuildLogInfo {
    pub log_id: LogId,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub requester: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub status: Option<BuildStatus>,
    pub kernel_name: Option<String>,
    pub image_path: Option<String>,
    /// Captured build output lines (header and trailer excluded)
    pub output_lines: usize,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>, retain: usize) -> Self {
        Self {
            dir: dir.into(),
            retain,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn retain(&self) -> usize {
        self.retain
    }

    pub fn path_for(&self, log_id: &LogId) -> PathBuf {
        self.dir.join(log_id.file_name())
    }

    /// Fresh id for a run starting at `at`. Steps forward one second at a time while
    /// a log with that name already exists, so back-to-back runs never share a log.
    pub async fn allocate_id(&self, at: DateTime<Local>) -> LogId {
        let mut at = at;
        loop {
            let id = LogId::at(at);
            if !fs::try_exists(self.path_for(&id)).await.unwrap_or(false) {
                return id;
            }
            at += chrono::Duration::seconds(1);
        }
    }

    /// Create the log for `run` and write its header.
    pub async fn create(&self, run: &BuildRun) -> BuildResult<BuildLog> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&run.log_id);
        let file = File::create(&path).await?;
        let mut log = BuildLog {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        };

        let header = format!(
            "{REQUESTER_KEY} {}\n{BRANCH_KEY} {}\n{COMMIT_KEY} {}\n{STARTED_KEY} {}\n",
            run.requester,
            run.vcs.branch,
            run.vcs.commit,
            run.started_at.to_rfc3339()
        );
        log.writer.write_all(header.as_bytes()).await?;
        log.writer.flush().await?;

        debug!(path = %log.path.display(), "created build log");
        Ok(log)
    }

    /// Build log names, oldest first.
    async fn log_file_names(&self) -> anyhow::Result<Vec<String>> {
        if !fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(vec![]);
        }

        let mut entries = fs::read_dir(&self.dir)
            .await
            .context("failed to read log directory")?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to read directory entry")?
        {
            if let Some(name) = entry.file_name().to_str() {
                if LogId::is_log_file_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Stored logs, newest first.
    pub async fn list(&self) -> BuildResult<Vec<LogEntry>> {
        let names = self
            .log_file_names()
            .await
            .map_err(|e| BuildError::LogIo(std::io::Error::other(format!("{e:#}"))))?;

        let mut listed = Vec::with_capacity(names.len());
        for name in names.into_iter().rev() {
            let Some(log_id) = LogId::parse(&name) else {
                continue;
            };
            let size_bytes = fs::metadata(self.dir.join(&name))
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            listed.push(LogEntry {
                log_id,
                file_name: name,
                size_bytes,
            });
        }
        Ok(listed)
    }

    /// Most recent log, if any.
    pub async fn latest(&self) -> BuildResult<Option<LogEntry>> {
        Ok(self.list().await?.into_iter().next())
    }

    /// Delete all but the newest `retain` logs.
    ///
    /// A failed deletion is logged and counted; only an unreadable directory is
    /// reported as an error.
    pub async fn trim(&self) -> BuildResult<TrimReport> {
        let names = self
            .log_file_names()
            .await
            .map_err(|e| BuildError::Retention(format!("{e:#}")))?;

        let excess = names.len().saturating_sub(self.retain);
        let mut report = TrimReport {
            total: names.len(),
            retain: self.retain,
            ..Default::default()
        };

        for name in names.into_iter().take(excess) {
            let path = self.dir.join(&name);
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "deleted old build log");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete old build log");
                    report.failed += 1;
                }
            }
        }

        if !report.deleted.is_empty() {
            info!(
                deleted = report.deleted.len(),
                retained = self.retain,
                "trimmed build logs"
            );
        }

        Ok(report)
    }

    /// Read back what a build log records about its run.
    pub async fn info(&self, log_id: &LogId) -> BuildResult<BuildLogInfo> {
        let path = self.path_for(log_id);
        let bytes = fs::read(&path).await?;
        let content = String::from_utf8_lossy(&bytes);

        let mut info = BuildLogInfo {
            log_id: log_id.clone(),
            path,
            size_bytes: bytes.len() as u64,
            requester: None,
            branch: None,
            commit: None,
            started_at: None,
            finished_at: None,
            status: None,
            kernel_name: None,
            image_path: None,
            output_lines: 0,
        };

        let lines: Vec<&str> = content.lines().collect();
        let header_len = lines.len().min(HEADER_LINES);
        for line in &lines[..header_len] {
            if let Some(v) = line.strip_prefix(REQUESTER_KEY) {
                info.requester = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix(BRANCH_KEY) {
                info.branch = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix(COMMIT_KEY) {
                info.commit = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix(STARTED_KEY) {
                info.started_at = Some(v.trim().to_string());
            }
        }

        let mut body = &lines[header_len..];
        if let Some((last, rest)) = body.split_last() {
            if let Some(trailer) = last.strip_prefix(FINISHED_KEY) {
                let (finished, status) = trailer
                    .split_once(STATUS_KEY)
                    .map_or((trailer, None), |(f, s)| (f, Some(s)));
                info.finished_at = Some(finished.trim().to_string());
                info.status = status.and_then(|s| BuildStatus::from_str(s.trim()));
                body = rest;
            }
        }

        let mut classifier = OutputClassifier::new();
        for line in body {
            classifier.observe(line);
        }
        info.kernel_name = classifier.kernel_name().map(str::to_string);
        info.image_path = classifier.image_path().map(str::to_string);
        info.output_lines = body.len();

        Ok(info)
    }
}

/// Open build log, written only by the task driving the run.
#[derive(Debug)]
pub struct BuildLog {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl BuildLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Output lines appended so far.
    pub const fn lines(&self) -> usize {
        self.lines
    }

    /// Append one output line.
    pub async fn append(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.lines += 1;
        Ok(())
    }

    /// Write the trailer and flush everything to disk.
    pub async fn finish(mut self, run: &BuildRun) -> std::io::Result<PathBuf> {
        let finished = run
            .finished_at
            .map_or_else(|| Local::now().to_rfc3339(), |t| t.to_rfc3339());
        let trailer = format!("{FINISHED_KEY} {finished}{STATUS_KEY} {}\n", run.status);
        self.writer.write_all(trailer.as_bytes()).await?;
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::VcsSnapshot;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    fn run_at(day: u32) -> BuildRun {
        let at = Local.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap();
        BuildRun::new(LogId::at(at), "alice", VcsSnapshot::new("main", "abc123"), at)
    }

    fn seed_logs(dir: &Path, count: u32) -> Vec<String> {
        std::fs::create_dir_all(dir).unwrap();
        (1..=count)
            .map(|i| {
                let name = format!("build_202501{i:02}_120000.log");
                std::fs::write(dir.join(&name), "line\n").unwrap();
                name
            })
            .collect()
    }

    #[tokio::test]
    async fn test_trim_removes_oldest_beyond_retention() {
        let temp_dir = TempDir::new().unwrap();
        let names = seed_logs(temp_dir.path(), 13);
        let store = LogStore::new(temp_dir.path(), 10);

        let report = store.trim().await.unwrap();

        assert_eq!(report.total, 13);
        assert_eq!(report.deleted, names[..3].to_vec());
        assert_eq!(report.failed, 0);
        for name in &names[..3] {
            assert!(!temp_dir.path().join(name).exists());
        }
        for name in &names[3..] {
            assert!(temp_dir.path().join(name).exists());
        }
    }

    #[tokio::test]
    async fn test_trim_under_limit_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        seed_logs(temp_dir.path(), 4);
        let store = LogStore::new(temp_dir.path(), 10);

        let report = store.trim().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(store.list().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_trim_ignores_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        seed_logs(temp_dir.path(), 3);
        std::fs::write(temp_dir.path().join("kernelwatch.log"), "ops").unwrap();
        std::fs::write(temp_dir.path().join("README"), "keep").unwrap();
        let store = LogStore::new(temp_dir.path(), 1);

        let report = store.trim().await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert!(temp_dir.path().join("kernelwatch.log").exists());
        assert!(temp_dir.path().join("README").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::new(temp_dir.path().join("absent"), 10);
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.trim().await.unwrap().total, 0);
        assert!(store.latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        seed_logs(temp_dir.path(), 3);
        let store = LogStore::new(temp_dir.path(), 10);

        let listed = store.list().await.unwrap();
        let names: Vec<_> = listed.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "build_20250103_120000.log",
                "build_20250102_120000.log",
                "build_20250101_120000.log"
            ]
        );
        assert_eq!(listed[0].size_bytes, 5);
    }

    #[tokio::test]
    async fn test_log_round_trip_through_info() {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::new(temp_dir.path().join("logs"), 10);
        let mut run = run_at(5);
        run.start().unwrap();

        let mut log = store.create(&run).await.unwrap();
        log.append("Applying patch foo").await.unwrap();
        log.append("Using kernel name: sdm845").await.unwrap();
        log.append("Kernel image: /out/Image.gz").await.unwrap();
        assert_eq!(log.lines(), 3);

        run.finish(BuildStatus::Success).unwrap();
        let path = log.finish(&run).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3 + HEADER_LINES + TRAILER_LINES);

        let info = store.info(&run.log_id).await.unwrap();
        assert_eq!(info.requester.as_deref(), Some("alice"));
        assert_eq!(info.branch.as_deref(), Some("main"));
        assert_eq!(info.commit.as_deref(), Some("abc123"));
        assert_eq!(info.status, Some(BuildStatus::Success));
        assert_eq!(info.kernel_name.as_deref(), Some("sdm845"));
        assert_eq!(info.image_path.as_deref(), Some("/out/Image.gz"));
        assert_eq!(info.output_lines, 3);
        assert!(info.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_info_of_interrupted_log_has_no_trailer() {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::new(temp_dir.path(), 10);
        let run = run_at(6);
        std::fs::write(
            store.path_for(&run.log_id),
            "# requester: alice\n# branch: main\n# commit: abc123\n# started: now\nhalf way\n",
        )
        .unwrap();

        let info = store.info(&run.log_id).await.unwrap();
        assert_eq!(info.status, None);
        assert_eq!(info.finished_at, None);
        assert_eq!(info.output_lines, 1);
    }

    #[tokio::test]
    async fn test_allocate_id_skips_taken_names() {
        let temp_dir = TempDir::new().unwrap();
        seed_logs(temp_dir.path(), 1);
        let store = LogStore::new(temp_dir.path(), 10);

        let at = Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let id = store.allocate_id(at).await;
        assert_eq!(id.as_str(), "build_20250101_120001");

        let free = Local.with_ymd_and_hms(2025, 1, 2, 8, 0, 0).unwrap();
        assert_eq!(store.allocate_id(free).await, LogId::at(free));
    }

    #[tokio::test]
    async fn test_info_missing_log_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::new(temp_dir.path(), 10);
        let id = LogId::parse("build_20250101_000000").unwrap();
        assert!(matches!(store.info(&id).await, Err(BuildError::LogIo(_))));
    }
}
