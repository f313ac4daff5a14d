//! Build log commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::format_size;
use crate::services::{LogEntry, TrimReport};

#[derive(Args, Debug)]
pub struct LogsArgs {
    #[command(subcommand)]
    pub command: LogsCommands,
}

#[derive(Subcommand, Debug)]
pub enum LogsCommands {
    /// List stored build logs, newest first
    List {
        /// Maximum number of logs to show (defaults to `logs.list_limit`)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete all but the newest `logs.retain` build logs
    Clean,
}

#[derive(Debug, Serialize)]
pub struct LogListOutput {
    pub dir: String,
    pub logs: Vec<LogEntry>,
    pub total: usize,
}

impl CommandOutput for LogListOutput {
    fn to_human(&self) -> String {
        if self.logs.is_empty() {
            return format!("No build logs found in {}.", self.dir);
        }

        let mut table = list_table(&["log id", "size"]);
        for entry in &self.logs {
            table.add_row(vec![entry.log_id.to_string(), format_size(entry.size_bytes)]);
        }
        format!(
            "Showing {} of {} build log(s) in {}:\n{table}",
            self.logs.len(),
            self.total,
            self.dir
        )
    }
}

#[derive(Debug, Serialize)]
pub struct CleanOutput {
    #[serde(flatten)]
    pub report: TrimReport,
}

impl CommandOutput for CleanOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let mut message = if report.deleted.is_empty() {
            format!(
                "Nothing to clean: {} build log(s), keeping up to {}.",
                report.total, report.retain
            )
        } else {
            format!(
                "Deleted {} of {} build log(s), keeping the newest {}.",
                report.deleted.len(),
                report.total,
                report.retain
            )
        };
        if report.failed > 0 {
            message.push_str(&format!(" {} deletion(s) failed.", report.failed));
        }
        message
    }
}

pub async fn list_logs(ctx: &AppContext, limit: Option<usize>) -> Result<LogListOutput> {
    let store = ctx.supervisor.log_store();
    let mut logs = store.list().await.context("Failed to list build logs")?;
    let total = logs.len();
    logs.truncate(limit.unwrap_or(ctx.config.logs.list_limit));

    Ok(LogListOutput {
        dir: store.dir().display().to_string(),
        logs,
        total,
    })
}

pub async fn clean_logs(ctx: &AppContext) -> Result<CleanOutput> {
    let report = ctx
        .supervisor
        .log_store()
        .trim()
        .await
        .context("Failed to clean build logs")?;
    Ok(CleanOutput { report })
}

pub async fn execute(args: LogsArgs, ctx: &AppContext) -> Result<()> {
    match args.command {
        LogsCommands::List { limit } => output(&list_logs(ctx, limit).await?, ctx.json),
        LogsCommands::Clean => output(&clean_logs(ctx).await?, ctx.json),
    }
    Ok(())
}
