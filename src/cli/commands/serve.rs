//! `serve`: long-running console front end.
//!
//! Reads one verb per line from stdin. Builds run in the background so `stop`
//! and `status` stay responsive while one is in flight.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cli::commands::build::BuildOutput;
use crate::cli::commands::{artifacts, info, logs, status};
use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput, MessageOutput};
use crate::services::StopOutcome;

const HELP: &str = "\
Commands:
  build               start a kernel build
  stop                stop the running build
  status              show the running and latest build
  logs [N]            list the newest build logs
  clean               delete old build logs
  info <log id>       show what a build log recorded
  artifacts [kernel]  list flashable archives
  restart             stop everything and exit for the service manager to restart
  help                show this help
  quit                stop any build and exit";

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Name recorded as the requester of builds started from this console
    #[arg(short, long, env = "USER", default_value = "operator")]
    pub requester: String,
}

/// One console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeCommand {
    Build,
    Stop,
    Status,
    Logs(Option<usize>),
    Clean,
    Info(Option<String>),
    Artifacts(Option<String>),
    Restart,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ServeCommand {
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Self::Empty;
        };
        let rest = words.next().map(str::to_string);

        match verb.trim_start_matches('/').to_lowercase().as_str() {
            "build" => Self::Build,
            "stop" => Self::Stop,
            "status" => Self::Status,
            "logs" => match rest {
                Some(n) => n.parse().map_or_else(
                    |_| Self::Unknown(line.trim().to_string()),
                    |n| Self::Logs(Some(n)),
                ),
                None => Self::Logs(None),
            },
            "clean" => Self::Clean,
            "info" => Self::Info(rest),
            "artifacts" => Self::Artifacts(rest),
            "restart" => Self::Restart,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(line.trim().to_string()),
        }
    }
}

enum Flow {
    Continue,
    Exit,
}

fn reply<T: CommandOutput>(result: Result<T>, json: bool) {
    match result {
        Ok(out) => output(&out, json),
        Err(e) => output(&MessageOutput::new(format!("Error: {e:#}")), json),
    }
}

fn describe_stop(outcome: &StopOutcome) -> MessageOutput {
    match outcome {
        StopOutcome::NothingToStop => MessageOutput::new("Nothing to stop."),
        StopOutcome::Stopped { log_id } => MessageOutput::new(format!("Build {log_id} stopped.")),
    }
}

async fn dispatch(
    command: ServeCommand,
    args: &ServeArgs,
    ctx: &AppContext,
    builds: &mut JoinSet<()>,
) -> Flow {
    let json = ctx.json;
    match command {
        ServeCommand::Build => {
            let supervisor = Arc::clone(&ctx.supervisor);
            let vcs = ctx.vcs.snapshot().await;
            let requester = args.requester.clone();
            builds.spawn(async move {
                match supervisor.start_build(&requester, vcs).await {
                    Ok(run) => output(&BuildOutput { run }, json),
                    // The reporter has already told the operator.
                    Err(e) => debug!(error = %e, "build not started"),
                }
            });
        }
        ServeCommand::Stop => output(&describe_stop(&ctx.supervisor.stop_build().await), json),
        ServeCommand::Status => reply(status::collect_status(ctx).await, json),
        ServeCommand::Logs(limit) => reply(logs::list_logs(ctx, limit).await, json),
        ServeCommand::Clean => reply(logs::clean_logs(ctx).await, json),
        ServeCommand::Info(Some(log_id)) => reply(info::build_info(ctx, &log_id).await, json),
        ServeCommand::Info(None) => output(&MessageOutput::new("Usage: info <log id>"), json),
        ServeCommand::Artifacts(kernel) => {
            reply(artifacts::list_artifacts(ctx, kernel.as_deref()).await, json);
        }
        ServeCommand::Restart => {
            ctx.notifier.notify("Restarting...").await;
            let outcome = ctx.supervisor.request_shutdown().await;
            output(&describe_stop(&outcome), json);
            output(&MessageOutput::new("Restarting."), json);
            return Flow::Exit;
        }
        ServeCommand::Help => output(&MessageOutput::new(HELP), json),
        ServeCommand::Quit => return Flow::Exit,
        ServeCommand::Empty => {}
        ServeCommand::Unknown(line) => output(
            &MessageOutput::new(format!("Unknown command '{line}'. Type 'help' for the list.")),
            json,
        ),
    }
    Flow::Continue
}

pub async fn execute(args: ServeArgs, ctx: &AppContext) -> Result<()> {
    ctx.notifier.notify("Monitor Starting").await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = ctx.supervisor.shutdown_signal();
    let mut builds = JoinSet::new();

    info!(requester = %args.requester, "console ready");
    ctx.notifier.notify("Monitor Ready").await;
    if !ctx.json {
        println!("kernelwatch ready. Type 'help' for commands.");
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read console input")? {
                    Some(line) => {
                        let command = ServeCommand::parse(&line);
                        if matches!(dispatch(command, &args, ctx, &mut builds).await, Flow::Exit) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(joined) = builds.join_next(), if !builds.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "build task failed");
                }
            }
            _ = shutdown.changed() => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    if ctx.supervisor.is_building() {
        info!("stopping running build before exit");
        ctx.supervisor.stop_build().await;
    }
    while let Some(joined) = builds.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "build task failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbs() {
        assert_eq!(ServeCommand::parse("build"), ServeCommand::Build);
        assert_eq!(ServeCommand::parse("  /stop "), ServeCommand::Stop);
        assert_eq!(ServeCommand::parse("STATUS"), ServeCommand::Status);
        assert_eq!(ServeCommand::parse("logs"), ServeCommand::Logs(None));
        assert_eq!(ServeCommand::parse("logs 3"), ServeCommand::Logs(Some(3)));
        assert_eq!(
            ServeCommand::parse("info build_20250101_120000"),
            ServeCommand::Info(Some("build_20250101_120000".to_string()))
        );
        assert_eq!(ServeCommand::parse("info"), ServeCommand::Info(None));
        assert_eq!(
            ServeCommand::parse("artifacts sdm845"),
            ServeCommand::Artifacts(Some("sdm845".to_string()))
        );
        assert_eq!(ServeCommand::parse(""), ServeCommand::Empty);
        assert_eq!(ServeCommand::parse("exit"), ServeCommand::Quit);
    }

    #[test]
    fn test_parse_rejects_unknown_input() {
        assert_eq!(
            ServeCommand::parse("flash now"),
            ServeCommand::Unknown("flash now".to_string())
        );
        assert_eq!(
            ServeCommand::parse("logs many"),
            ServeCommand::Unknown("logs many".to_string())
        );
    }
}
