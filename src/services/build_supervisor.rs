//! Build supervisor.
//!
//! Drives one external build at a time: launches the build script in its own
//! process group, pumps its merged stdout/stderr into the build log and the output
//! classifier, enforces the wall-clock ceiling, and on exit packages the kernel,
//! reports to the operator and trims old logs.
//!
//! The task calling [`BuildSupervisor::start_build`] owns the child process for the
//! whole run. Other tasks reach it only through the [`ExclusivitySlot`]: they can
//! read a live snapshot of the run or post a stop request, which the owning task
//! carries out and acknowledges once the run is finalized.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{
    Artifact, BuildConfig, BuildRun, BuildStatus, Config, LogId, VcsSnapshot,
};
use crate::domain::ports::{BuildReporter, StatusNotifier};
use crate::services::artifact_packager::ArtifactPackager;
use crate::services::exclusivity::{ExclusivitySlot, ExclusivityToken, SlotGuard, StopAck};
use crate::services::log_store::{BuildLog, LogStore};
use crate::services::output_classifier::OutputClassifier;

/// Tracing target the build output is mirrored under.
pub const BUILD_OUTPUT_TARGET: &str = "kernelwatch::build_output";

const LINE_CHANNEL_CAPACITY: usize = 256;

/// Readable end of the build's output.
type OutputStream = Box<dyn AsyncRead + Unpin + Send>;

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// No build was running, or it had already finished producing output
    NothingToStop,
    /// The running build was terminated and finalized
    Stopped { log_id: LogId },
}

/// Snapshot returned by [`BuildSupervisor::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    /// Build in flight, if any
    pub active: Option<BuildRun>,
    /// Most recent run finished by this process
    pub last: Option<BuildRun>,
}

/// Why the output pump stopped.
enum Ending {
    Exited(ExitStatus),
    Deadline,
    Stop(StopAck),
    Fault(String),
}

/// Ordered, non-blocking delivery of display notifications for one run.
struct NotificationQueue {
    tx: mpsc::UnboundedSender<String>,
    worker: JoinHandle<()>,
}

impl NotificationQueue {
    fn start(notifier: Arc<dyn StatusNotifier>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if !notifier.notify(&message).await {
                    debug!(message = %message, "status display did not take notification");
                }
            }
        });
        Self { tx, worker }
    }

    fn push(&self, message: &str) {
        if self.tx.send(message.to_string()).is_err() {
            debug!(message, "notification worker gone");
        }
    }

    /// Wait until everything queued has been delivered (or given up on).
    async fn drain(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "notification worker failed");
        }
    }
}

/// Supervises kernel builds.
pub struct BuildSupervisor {
    build: BuildConfig,
    logs: LogStore,
    packager: ArtifactPackager,
    notifier: Arc<dyn StatusNotifier>,
    reporter: Arc<dyn BuildReporter>,
    slot: Arc<ExclusivitySlot>,
    last_run: Mutex<Option<BuildRun>>,
    shutdown: watch::Sender<bool>,
}

impl BuildSupervisor {
    pub fn new(
        config: &Config,
        notifier: Arc<dyn StatusNotifier>,
        reporter: Arc<dyn BuildReporter>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            build: config.build.clone(),
            logs: LogStore::new(config.logs.dir.clone(), config.logs.retain),
            packager: ArtifactPackager::new(
                config.artifacts.clone(),
                config.build.project_dir.clone(),
            ),
            notifier,
            reporter,
            slot: ExclusivitySlot::new(),
            last_run: Mutex::new(None),
            shutdown,
        }
    }

    pub fn log_store(&self) -> &LogStore {
        &self.logs
    }

    pub fn packager(&self) -> &ArtifactPackager {
        &self.packager
    }

    pub fn is_building(&self) -> bool {
        self.slot.is_held()
    }

    /// Run one build to completion.
    ///
    /// Returns the finished run for every outcome the build itself can have
    /// (success, failure, timeout, error, stopped). The only error returned is
    /// [`BuildError::AlreadyRunning`] when another build holds the slot.
    pub async fn start_build(&self, requester: &str, vcs: VcsSnapshot) -> BuildResult<BuildRun> {
        let started_at = Local::now();
        let log_id = self.logs.allocate_id(started_at).await;
        let mut run = BuildRun::new(log_id, requester, vcs, started_at);

        let (progress, progress_rx) = watch::channel(run.clone());
        let (stop_tx, stop_rx) = mpsc::channel::<StopAck>(1);
        let token = ExclusivityToken::new(run.log_id.clone(), progress_rx, stop_tx);

        let guard = match self.slot.try_acquire(token) {
            Ok(guard) => guard,
            Err(e) => {
                if let BuildError::AlreadyRunning(active) = &e {
                    info!(requester, active = %active, "build request rejected");
                    self.report(&format!(
                        "A build is already running ({active}). Stop it before starting another."
                    ))
                    .await;
                }
                return Err(e);
            }
        };

        info!(
            log_id = %run.log_id,
            requester,
            branch = %run.vcs.branch,
            commit = %run.vcs.commit,
            "starting build"
        );

        let notifications = NotificationQueue::start(Arc::clone(&self.notifier));
        notifications.push("Build Started");
        self.report(&format!(
            "Starting kernel build {} on {} ({}), requested by {}",
            run.log_id, run.vcs.branch, run.vcs.commit, run.requester
        ))
        .await;

        let log = match self.logs.create(&run).await {
            Ok(log) => log,
            Err(e) => {
                error!(log_id = %run.log_id, error = %e, "failed to create build log");
                Self::settle(&mut run, BuildStatus::Error, Some(e.to_string()));
                self.report(&format!("Critical build error: {e}")).await;
                notifications.push("Critical Error");
                self.finalize(run.clone(), guard, None, notifications).await;
                return Ok(run);
            }
        };

        let (mut child, streams) = match self.spawn_build() {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(log_id = %run.log_id, error = %e, "failed to launch build");
                Self::settle(&mut run, BuildStatus::Error, Some(e.to_string()));
                progress.send_replace(run.clone());
                let log_path = Self::close_log(log, &run).await;
                self.report(&format!("Critical build error: {e}")).await;
                notifications.push("Critical Error");
                self.send_log(log_path.as_deref(), &run).await;
                self.finalize(run.clone(), guard, None, notifications).await;
                return Ok(run);
            }
        };

        if let Err(e) = run.start() {
            warn!(error = %e, "unexpected build state");
        }
        progress.send_replace(run.clone());

        let (mut run, log, ack) = self
            .pump(run, log, &mut child, streams, &progress, stop_rx, &notifications)
            .await;

        let log_path = Self::close_log(log, &run).await;
        run.artifact = self
            .report_outcome(&run, log_path.as_deref(), &notifications)
            .await;
        progress.send_replace(run.clone());

        self.finalize(run.clone(), guard, ack, notifications).await;
        Ok(run)
    }

    /// Ask the running build to stop and wait until it has been finalized.
    ///
    /// Idempotent: with no build in flight, or one that has already finished
    /// producing output, this returns [`StopOutcome::NothingToStop`].
    pub async fn stop_build(&self) -> StopOutcome {
        let Some((log_id, stop_tx)) = self.slot.stop_handle() else {
            return StopOutcome::NothingToStop;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(ack_tx).await.is_err() || ack_rx.await.is_err() {
            debug!(log_id = %log_id, "build finished before the stop request landed");
            return StopOutcome::NothingToStop;
        }

        info!(log_id = %log_id, "build stopped");
        self.notifier.notify("Build Stopped").await;
        StopOutcome::Stopped { log_id }
    }

    /// Live view of the build in flight plus the last finished run.
    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            active: self.slot.snapshot(),
            last: self
                .last_run
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Stop any running build and tell the front end to exit.
    pub async fn request_shutdown(&self) -> StopOutcome {
        let outcome = self.stop_build().await;
        self.shutdown.send_replace(true);
        info!("shutdown requested");
        outcome
    }

    /// Resolves once [`request_shutdown`](Self::request_shutdown) has been called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Launch the build with stdout and stderr wired to its output streams.
    fn spawn_build(&self) -> BuildResult<(Child, Vec<OutputStream>)> {
        let program = self.program_path();
        let launch_error = |source: io::Error| BuildError::ProcessLaunch {
            program: program.display().to_string(),
            source,
        };

        let mut command = Command::new(&program);
        command
            .args(&self.build.args)
            .current_dir(&self.build.project_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let mut streams = attach_output(&mut command).map_err(launch_error)?;
        let mut child = command.spawn().map_err(launch_error)?;
        // Dropping `command` closes the parent's copies of the write ends.
        drop(command);

        if let Some(stdout) = child.stdout.take() {
            streams.push(Box::new(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            streams.push(Box::new(stderr));
        }
        Ok((child, streams))
    }

    /// Build executable; relative paths with a directory part are resolved
    /// against the project directory, bare names go through `PATH`.
    fn program_path(&self) -> PathBuf {
        let script = &self.build.script;
        if script.is_absolute() || script.components().count() == 1 {
            return script.clone();
        }
        let joined = self.build.project_dir.join(script);
        std::path::absolute(&joined).unwrap_or(joined)
    }

    /// Pump output until the process exits, the deadline passes, a stop request
    /// arrives or the log cannot be written.
    async fn pump(
        &self,
        mut run: BuildRun,
        mut log: BuildLog,
        child: &mut Child,
        streams: Vec<OutputStream>,
        progress: &watch::Sender<BuildRun>,
        mut stop_rx: mpsc::Receiver<StopAck>,
        notifications: &NotificationQueue,
    ) -> (BuildRun, BuildLog, Option<StopAck>) {
        let pid = child.id();
        let (line_tx, mut line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let readers: Vec<_> = streams
            .into_iter()
            .map(|stream| forward_lines(stream, line_tx.clone()))
            .collect();
        drop(line_tx);

        let mut classifier = OutputClassifier::new();
        let deadline = tokio::time::sleep(self.build.timeout());
        tokio::pin!(deadline);
        let mut stream_open = true;

        let ending = loop {
            tokio::select! {
                biased;

                Some(ack) = stop_rx.recv() => break Ending::Stop(ack),

                () = &mut deadline => break Ending::Deadline,

                line = line_rx.recv(), if stream_open => match line {
                    Some(Ok(line)) => {
                        if let Err(e) = log.append(&line).await {
                            break Ending::Fault(BuildError::LogIo(e).to_string());
                        }
                        info!(target: BUILD_OUTPUT_TARGET, log_id = %run.log_id, "{line}");

                        let phase = classifier.observe(&line);
                        run.lines_captured = log.lines();
                        run.kernel_name = classifier.kernel_name().map(str::to_string);
                        run.image_path = classifier.image_path().map(str::to_string);
                        if let Some(phase) = phase {
                            debug!(log_id = %run.log_id, phase = phase.as_str(), "build phase");
                            run.phases.push(phase);
                            notifications.push(phase.display_text());
                        }
                        progress.send_replace(run.clone());
                    }
                    Some(Err(e)) => break Ending::Fault(BuildError::StreamRead(e).to_string()),
                    None => stream_open = false,
                },

                status = child.wait(), if !stream_open => match status {
                    Ok(status) => break Ending::Exited(status),
                    Err(e) => break Ending::Fault(format!("failed to wait for build process: {e}")),
                },
            }
        };

        // Late stop requests find the channel closed and report nothing to stop.
        drop(stop_rx);

        let mut ack = None;
        match ending {
            Ending::Exited(status) => {
                run.exit_code = status.code();
                if status.success() {
                    Self::settle(&mut run, BuildStatus::Success, None);
                } else {
                    let failure = BuildError::ProcessFailure(status.code());
                    Self::settle(&mut run, BuildStatus::Failure, Some(failure.to_string()));
                }
            }
            Ending::Deadline => {
                warn!(
                    log_id = %run.log_id,
                    timeout_secs = self.build.timeout_secs,
                    "build exceeded its time limit"
                );
                self.terminate(child, pid).await;
                let timeout = BuildError::Timeout(self.build.timeout_secs);
                Self::settle(&mut run, BuildStatus::Timeout, Some(timeout.to_string()));
            }
            Ending::Stop(stop_ack) => {
                info!(log_id = %run.log_id, "stop requested");
                self.terminate(child, pid).await;
                Self::settle(&mut run, BuildStatus::Stopped, None);
                ack = Some(stop_ack);
            }
            Ending::Fault(reason) => {
                error!(log_id = %run.log_id, error = %reason, "build aborted");
                self.terminate(child, pid).await;
                Self::settle(&mut run, BuildStatus::Error, Some(reason));
            }
        }

        for reader in readers {
            reader.abort();
        }
        progress.send_replace(run.clone());
        (run, log, ack)
    }

    /// SIGTERM the build's process group, give it the grace period, then SIGKILL
    /// whatever is left.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) {
        signal_group(child, pid, false);

        match tokio::time::timeout(self.build.stop_grace(), child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "build process exited after termination request"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for build process"),
            Err(_) => {
                warn!(
                    grace_secs = self.build.stop_grace_secs,
                    "build process ignored termination request, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill build process");
                }
            }
        }

        // Descendants may outlive the script itself.
        signal_group(child, pid, true);
    }

    fn settle(run: &mut BuildRun, status: BuildStatus, error: Option<String>) {
        let result = match error {
            Some(error) => run.fail(status, error),
            None => run.finish(status),
        };
        if let Err(e) = result {
            warn!(log_id = %run.log_id, error = %e, "unexpected build state");
        }
    }

    async fn close_log(log: BuildLog, run: &BuildRun) -> Option<PathBuf> {
        match log.finish(run).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(log_id = %run.log_id, error = %e, "failed to finalize build log");
                None
            }
        }
    }

    /// Primary operator message, notification and documents for a finished run.
    /// Returns the packaged archive of a successful run.
    async fn report_outcome(
        &self,
        run: &BuildRun,
        log_path: Option<&Path>,
        notifications: &NotificationQueue,
    ) -> Option<Artifact> {
        let elapsed = format_elapsed(run.elapsed());
        let mut artifact = None;
        match run.status {
            BuildStatus::Success => {
                info!(log_id = %run.log_id, elapsed = %elapsed, "build succeeded");
                let kernel = run.kernel_name.as_deref().unwrap_or("unknown");
                self.report(&format!("Build succeeded in {elapsed} (kernel {kernel})"))
                    .await;
                notifications.push("Build Success");
                artifact = self.package_and_send(run).await;
            }
            BuildStatus::Failure => {
                let reason = run.error.as_deref().unwrap_or("unknown failure");
                warn!(log_id = %run.log_id, exit_code = ?run.exit_code, "build failed");
                self.report(&format!("Build failed after {elapsed}: {reason}"))
                    .await;
                notifications.push("Build Failed");
            }
            BuildStatus::Timeout => {
                self.report(&format!(
                    "Build timed out after {}s and was terminated",
                    self.build.timeout_secs
                ))
                .await;
                notifications.push("Timeout Error");
            }
            BuildStatus::Error => {
                let reason = run.error.as_deref().unwrap_or("unknown error");
                self.report(&format!("Critical build error: {reason}")).await;
                notifications.push("Critical Error");
            }
            // The stop requester sends the primary reply.
            BuildStatus::Stopped | BuildStatus::Pending | BuildStatus::Running => {}
        }

        self.send_log(log_path, run).await;
        artifact
    }

    async fn package_and_send(&self, run: &BuildRun) -> Option<Artifact> {
        match self
            .packager
            .pack(run.kernel_name.as_deref(), run.image_path.as_deref())
            .await
        {
            Ok(artifact) => {
                let caption = format!(
                    "Flashable archive {} ({})",
                    artifact.name,
                    artifact.display_size()
                );
                if let Err(e) = self.reporter.send_document(&artifact.path, &caption).await {
                    warn!(error = %e, "failed to send archive");
                }
                Some(artifact)
            }
            Err(e) => {
                warn!(log_id = %run.log_id, error = %e, "packaging failed");
                self.report(&format!("Build succeeded but no archive was produced: {e}"))
                    .await;
                None
            }
        }
    }

    async fn send_log(&self, log_path: Option<&Path>, run: &BuildRun) {
        let Some(path) = log_path else {
            return;
        };
        let caption = match run.status {
            BuildStatus::Success => format!("Build log {}", run.log_id),
            BuildStatus::Stopped => format!("Build log {} (stopped)", run.log_id),
            status => format!("Build log {} ({status}, partial)", run.log_id),
        };
        if let Err(e) = self.reporter.send_document(path, &caption).await {
            warn!(log_id = %run.log_id, error = %e, "failed to send build log");
        }
    }

    /// Steps every run ends with, whatever its outcome.
    async fn finalize(
        &self,
        run: BuildRun,
        guard: SlotGuard,
        ack: Option<StopAck>,
        notifications: NotificationQueue,
    ) {
        if let Err(e) = self.logs.trim().await {
            warn!(error = %e, "log retention failed");
        }

        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(run);
        drop(guard);

        // Queued notifications go out before the stop requester posts its own.
        notifications.drain().await;
        if let Some(ack) = ack {
            if ack.send(()).is_err() {
                debug!("stop requester went away before acknowledgement");
            }
        }
    }

    async fn report(&self, text: &str) {
        if let Err(e) = self.reporter.send_message(text).await {
            warn!(error = %e, "failed to deliver operator message");
        }
    }
}

/// Forward lines from one pipe into the shared channel. Invalid UTF-8 is replaced
/// rather than ending the stream.
fn forward_lines<R>(reader: R, tx: mpsc::Sender<io::Result<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(Ok(line)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    })
}

/// Point stdout and stderr at one pipe so the build's output arrives in the
/// order it was written.
#[cfg(unix)]
fn attach_output(command: &mut Command) -> io::Result<Vec<OutputStream>> {
    use std::os::fd::OwnedFd;
    use tokio::net::unix::pipe;

    let (reader, writer) = io::pipe()?;
    command
        .stdout(Stdio::from(writer.try_clone()?))
        .stderr(Stdio::from(writer));
    let reader = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    Ok(vec![Box::new(reader)])
}

/// Separate pipes; interleaving between the two is not preserved here.
#[cfg(not(unix))]
fn attach_output(command: &mut Command) -> io::Result<Vec<OutputStream>> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    Ok(vec![])
}

#[cfg(unix)]
fn signal_group(child: &mut Child, pid: Option<u32>, force: bool) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        if !force {
            let _ = child.start_kill();
        }
        return;
    };
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, ?signal, error = %e, "failed to signal build process group"),
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _pid: Option<u32>, force: bool) {
    if !force {
        if let Err(e) = child.start_kill() {
            warn!(error = %e, "failed to kill build process");
        }
    }
}

fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
