//! Wiring shared by every command: configuration, adapters and the supervisor.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::notifier::{HttpDisplayNotifier, NullNotifier};
use crate::adapters::reporter::ConsoleReporter;
use crate::adapters::vcs::GitCli;
use crate::domain::models::Config;
use crate::domain::ports::{StatusNotifier, VcsProvider};
use crate::infrastructure::config::ConfigLoader;
use crate::services::BuildSupervisor;

pub struct AppContext {
    pub config: Config,
    pub notifier: Arc<dyn StatusNotifier>,
    pub vcs: Arc<dyn VcsProvider>,
    pub supervisor: Arc<BuildSupervisor>,
    pub json: bool,
}

impl AppContext {
    /// Load configuration (from `config_path` or the project directory).
    pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
        match config_path {
            Some(path) => ConfigLoader::load_from_file(path),
            None => ConfigLoader::load(),
        }
    }

    pub fn new(config: Config, json: bool) -> Result<Self> {
        let notifier: Arc<dyn StatusNotifier> = if config.notifier.enabled {
            Arc::new(
                HttpDisplayNotifier::new(&config.notifier)
                    .context("Failed to set up the status display notifier")?,
            )
        } else {
            Arc::new(NullNotifier)
        };
        let vcs: Arc<dyn VcsProvider> = Arc::new(GitCli::new(config.build.project_dir.clone()));
        let supervisor = Arc::new(BuildSupervisor::new(
            &config,
            Arc::clone(&notifier),
            Arc::new(ConsoleReporter::new(json)),
        ));

        Ok(Self {
            config,
            notifier,
            vcs,
            supervisor,
            json,
        })
    }
}
