use crate::output::print_json;
use actions_core::{config::Config, scaffold};
use anyhow::Context;
use chrono::Utc;
use std::path::Path;

pub fn run(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let path = scaffold::make_action(&config.actions_path(root), name, Utc::now())
        .with_context(|| format!("failed to create action '{}'", name.trim()))?;
    let identifier = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let shown = path.strip_prefix(root).unwrap_or(&path);

    if json {
        print_json(&serde_json::json!({
            "identifier": identifier,
            "path": shown.display().to_string(),
        }))?;
    } else {
        println!("Created action: {}", shown.display());
    }
    Ok(())
}
