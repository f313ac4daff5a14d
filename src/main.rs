//! kernelwatch CLI entry point.

use clap::Parser;

use kernelwatch::cli::{AppContext, Cli, Commands};
use kernelwatch::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppContext::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => kernelwatch::cli::handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => kernelwatch::cli::handle_error(err, cli.json),
    };

    let ctx = match AppContext::new(config, cli.json) {
        Ok(ctx) => ctx,
        Err(err) => kernelwatch::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Build(args) => kernelwatch::cli::commands::build::execute(args, &ctx).await,
        Commands::Serve(args) => kernelwatch::cli::commands::serve::execute(args, &ctx).await,
        Commands::Status => kernelwatch::cli::commands::status::execute(&ctx).await,
        Commands::Logs(args) => kernelwatch::cli::commands::logs::execute(args, &ctx).await,
        Commands::Info(args) => kernelwatch::cli::commands::info::execute(args, &ctx).await,
        Commands::Artifacts(args) => {
            kernelwatch::cli::commands::artifacts::execute(args, &ctx).await
        }
    };

    if let Err(err) = result {
        kernelwatch::cli::handle_error(err, cli.json);
    }
}
