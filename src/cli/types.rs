//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::artifacts::ArtifactsArgs;
use crate::cli::commands::build::BuildArgs;
use crate::cli::commands::info::InfoArgs;
use crate::cli::commands::logs::LogsArgs;
use crate::cli::commands::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "kernelwatch")]
#[command(about = "kernelwatch - kernel build supervisor", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .kernelwatch/config.yaml + local.yaml)
    #[arg(short, long, global = true, env = "KERNELWATCH_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one kernel build in the foreground (Ctrl-C stops it)
    Build(BuildArgs),

    /// Interactive console accepting build/stop/status/... verbs on stdin
    Serve(ServeArgs),

    /// Show display reachability and the latest build
    Status,

    /// Build log management
    Logs(LogsArgs),

    /// Show what a build log recorded
    Info(InfoArgs),

    /// List flashable archives
    Artifacts(ArtifactsArgs),
}
