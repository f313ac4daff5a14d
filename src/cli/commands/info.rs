//! `info`: what a build log says about its run.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, styled_status, CommandOutput};
use crate::domain::models::{format_size, Artifact, LogId};
use crate::services::BuildLogInfo;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Log id (`build_YYYYMMDD_HHMMSS`) or log file name
    pub log_id: String,
}

#[derive(Debug, Serialize)]
pub struct InfoOutput {
    #[serde(flatten)]
    pub info: BuildLogInfo,
    /// Archives whose name contains the detected kernel name
    pub archives: Vec<Artifact>,
}

impl CommandOutput for InfoOutput {
    fn to_human(&self) -> String {
        let info = &self.info;
        let unknown = || "unknown".to_string();
        let status = info
            .status
            .map_or_else(|| style("unfinished").yellow().to_string(), |s| styled_status(s).to_string());

        let mut lines = vec![
            format!("{} {}", style("Build").bold(), info.log_id),
            format!("  Status:      {status}"),
            format!("  Requester:   {}", info.requester.clone().unwrap_or_else(unknown)),
            format!(
                "  Source:      {} @ {}",
                info.branch.clone().unwrap_or_else(unknown),
                info.commit.clone().unwrap_or_else(unknown)
            ),
            format!("  Started:     {}", info.started_at.clone().unwrap_or_else(unknown)),
            format!("  Finished:    {}", info.finished_at.clone().unwrap_or_else(|| "-".to_string())),
            format!("  Kernel:      {}", info.kernel_name.clone().unwrap_or_else(unknown)),
            format!("  Image:       {}", info.image_path.clone().unwrap_or_else(unknown)),
            format!(
                "  Output:      {} line(s), {}",
                info.output_lines,
                format_size(info.size_bytes)
            ),
            format!("  Log file:    {}", info.path.display()),
        ];

        if self.archives.is_empty() {
            lines.push("  Archives:    none".to_string());
        } else {
            lines.push("  Archives:".to_string());
            for archive in &self.archives {
                lines.push(format!("    {} ({})", archive.name, archive.display_size()));
            }
        }
        lines.join("\n")
    }
}

pub async fn build_info(ctx: &AppContext, raw_id: &str) -> Result<InfoOutput> {
    let log_id = LogId::parse(raw_id)
        .ok_or_else(|| anyhow!("Invalid log id '{raw_id}', expected build_YYYYMMDD_HHMMSS"))?;

    let info = ctx
        .supervisor
        .log_store()
        .info(&log_id)
        .await
        .with_context(|| format!("Build log {log_id} not found"))?;

    let archives = match info.kernel_name.as_deref() {
        Some(kernel) if !kernel.is_empty() => ctx
            .supervisor
            .packager()
            .list_archives(Some(kernel))
            .await
            .context("Failed to list archives")?,
        _ => vec![],
    };

    Ok(InfoOutput { info, archives })
}

pub async fn execute(args: InfoArgs, ctx: &AppContext) -> Result<()> {
    output(&build_info(ctx, &args.log_id).await?, ctx.json);
    Ok(())
}
