//! `artifacts`: flashable archives on disk.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::Artifact;

#[derive(Args, Debug)]
pub struct ArtifactsArgs {
    /// Only archives whose name contains this kernel name
    #[arg(short, long)]
    pub kernel: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactListOutput {
    pub dir: String,
    pub filter: Option<String>,
    pub archives: Vec<Artifact>,
}

impl CommandOutput for ArtifactListOutput {
    fn to_human(&self) -> String {
        if self.archives.is_empty() {
            return match &self.filter {
                Some(kernel) => format!("No archives matching '{kernel}' in {}.", self.dir),
                None => format!("No archives found in {}.", self.dir),
            };
        }

        let mut table = list_table(&["archive", "kernel", "size", "created"]);
        for archive in &self.archives {
            table.add_row(vec![
                archive.name.clone(),
                archive.kernel_name.clone(),
                archive.display_size(),
                archive.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ]);
        }
        format!("{} archive(s) in {}:\n{table}", self.archives.len(), self.dir)
    }
}

pub async fn list_artifacts(ctx: &AppContext, kernel: Option<&str>) -> Result<ArtifactListOutput> {
    let packager = ctx.supervisor.packager();
    let archives = packager
        .list_archives(kernel)
        .await
        .context("Failed to list archives")?;

    Ok(ArtifactListOutput {
        dir: packager.artifacts_dir().display().to_string(),
        filter: kernel.map(str::to_string),
        archives,
    })
}

pub async fn execute(args: ArtifactsArgs, ctx: &AppContext) -> Result<()> {
    output(&list_artifacts(ctx, args.kernel.as_deref()).await?, ctx.json);
    Ok(())
}
