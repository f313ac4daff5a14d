//! `status`: display reachability, host load, the build in flight and the latest build.

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, styled_status, CommandOutput};
use crate::domain::models::{BuildRun, PhaseEvent};
use crate::infrastructure::resources::HostResources;
use crate::services::BuildLogInfo;

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub notifier_enabled: bool,
    pub display_reachable: bool,
    pub resources: HostResources,
    pub active: Option<BuildRun>,
    pub last: Option<BuildRun>,
    pub latest_log: Option<BuildLogInfo>,
    pub log_count: usize,
    pub archive_count: usize,
}

/// Multi-line summary of a run, live or finished.
pub fn describe_run(run: &BuildRun) -> String {
    let mut lines = vec![
        format!("{} [{}]", run.log_id, styled_status(run.status)),
        format!("  Requester: {}", run.requester),
        format!("  Source:    {} @ {}", run.vcs.branch, run.vcs.commit),
        format!(
            "  Started:   {} ({}s elapsed)",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.elapsed().num_seconds().max(0)
        ),
        format!(
            "  Phases:    patching x{}, building x{}",
            run.count_phase(PhaseEvent::Patching),
            run.count_phase(PhaseEvent::Building)
        ),
        format!("  Output:    {} line(s)", run.lines_captured),
    ];
    if let Some(kernel) = &run.kernel_name {
        lines.push(format!("  Kernel:    {kernel}"));
    }
    if let Some(artifact) = &run.artifact {
        lines.push(format!(
            "  Archive:   {} ({})",
            artifact.path.display(),
            artifact.display_size()
        ));
    }
    if let Some(error) = &run.error {
        lines.push(format!("  Error:     {}", style(error).red()));
    }
    lines.join("\n")
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let display = match (self.notifier_enabled, self.display_reachable) {
            (false, _) => style("disabled").dim().to_string(),
            (true, true) => style("reachable").green().to_string(),
            (true, false) => style("unreachable").red().to_string(),
        };

        let mut lines = vec![
            format!("{}", style("kernelwatch status").bold()),
            format!("  Display:   {display}"),
            format!("  CPU:       {:.1}%", self.resources.cpu_percent),
            format!(
                "  Memory:    {} / {} MB ({:.1}% used)",
                self.resources.memory_used_mb,
                self.resources.memory_total_mb,
                self.resources.memory_percent()
            ),
            format!("  Uptime:    {}", self.resources.uptime_display()),
            format!(
                "  Stored:    {} build log(s), {} archive(s)",
                self.log_count, self.archive_count
            ),
        ];

        match &self.active {
            Some(run) => lines.push(format!("\nRunning build:\n{}", describe_run(run))),
            None => lines.push("\nNo build running.".to_string()),
        }
        if let Some(run) = &self.last {
            lines.push(format!("\nLast build:\n{}", describe_run(run)));
        } else if let Some(info) = &self.latest_log {
            let status = info
                .status
                .map_or_else(|| "unfinished".to_string(), |s| styled_status(s).to_string());
            lines.push(format!(
                "\nLatest log: {} [{status}] kernel {}",
                info.log_id,
                info.kernel_name.as_deref().unwrap_or("unknown")
            ));
        }
        lines.join("\n")
    }
}

pub async fn collect_status(ctx: &AppContext) -> Result<StatusOutput> {
    let supervisor = &ctx.supervisor;
    let (display_reachable, resources) =
        tokio::join!(ctx.notifier.is_reachable(), HostResources::sample());
    let snapshot = supervisor.status();

    let logs = supervisor
        .log_store()
        .list()
        .await
        .context("Failed to list build logs")?;
    let latest_log = match logs.first() {
        Some(entry) => supervisor.log_store().info(&entry.log_id).await.ok(),
        None => None,
    };
    let archive_count = supervisor
        .packager()
        .list_archives(None)
        .await
        .context("Failed to list archives")?
        .len();

    ctx.notifier.notify("Status Checked").await;

    Ok(StatusOutput {
        notifier_enabled: ctx.config.notifier.enabled,
        display_reachable,
        resources,
        active: snapshot.active,
        last: snapshot.last,
        latest_log,
        log_count: logs.len(),
        archive_count,
    })
}

pub async fn execute(ctx: &AppContext) -> Result<()> {
    output(&collect_status(ctx).await?, ctx.json);
    Ok(())
}
