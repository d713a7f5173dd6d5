pub mod config;
pub mod init;
pub mod make;
pub mod run;
pub mod status;

use actions_core::{config::Config, ProjectRunner};
use anyhow::Context;
use std::path::Path;

/// Load the project config and open its runner.
pub fn open_runner(root: &Path, connection: Option<&str>) -> anyhow::Result<ProjectRunner> {
    let config = Config::load(root).context("failed to load config")?;
    ProjectRunner::open(root, &config, connection).context("failed to open runner")
}
