//! `build`: run one build in the foreground.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::cli::commands::status::describe_run;
use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{BuildRun, BuildStatus};

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Name recorded as the requester of the build
    #[arg(short, long, env = "USER", default_value = "operator")]
    pub requester: String,
}

#[derive(Debug, Serialize)]
pub struct BuildOutput {
    #[serde(flatten)]
    pub run: BuildRun,
}

impl CommandOutput for BuildOutput {
    fn to_human(&self) -> String {
        describe_run(&self.run)
    }
}

pub async fn execute(args: BuildArgs, ctx: &AppContext) -> Result<()> {
    let vcs = ctx.vcs.snapshot().await;

    // Ctrl-C stops the build instead of killing kernelwatch mid-run.
    let supervisor = Arc::clone(&ctx.supervisor);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping build");
            supervisor.stop_build().await;
        }
    });

    let result = ctx.supervisor.start_build(&args.requester, vcs).await;
    interrupt.abort();

    let run = result?;
    let status = run.status;
    output(&BuildOutput { run }, ctx.json);

    if status != BuildStatus::Success {
        bail!("Build finished with status {status}");
    }
    Ok(())
}
