use crate::output::print_json;
use actions_core::{config::Config, io, paths, SqliteLedger};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    if !json {
        println!("Initializing actions in: {}", root.display());
    }

    // 1. .actions/ and config.yaml
    io::ensure_dir(&paths::actions_dir(root))
        .with_context(|| format!("failed to create {}", paths::ACTIONS_DIR))?;
    let config_created = !paths::config_path(root).exists();
    if config_created {
        Config::new()
            .save(root)
            .context("failed to write config.yaml")?;
    }
    let config = Config::load(root).context("failed to load config")?;
    report(json, config_created, paths::CONFIG_FILE);

    // 2. Action source directory
    let actions_path = config.actions_path(root);
    let actions_created = !actions_path.is_dir();
    io::ensure_dir(&actions_path)
        .with_context(|| format!("failed to create {}", actions_path.display()))?;
    report(json, actions_created, &config.actions_dir);

    // 3. Ledger table in the default connection's database
    let conn = config
        .connection(&config.default_connection)
        .context("default connection is not configured")?;
    let db_path = paths::resolve(root, &conn.path);
    let ledger = SqliteLedger::open_path(&db_path, &config.table)
        .with_context(|| format!("failed to install ledger in {}", db_path.display()))?;
    if !json {
        println!(
            "  ledger:  {} ({})",
            ledger.table(),
            config.default_connection
        );
    }

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "config_created": config_created,
            "actions_dir": actions_path.display().to_string(),
            "ledger_table": ledger.table(),
            "connection": config.default_connection,
        }))?;
    }
    Ok(())
}

fn report(json: bool, created: bool, what: &str) {
    if json {
        return;
    }
    if created {
        println!("  created: {what}");
    } else {
        println!("  exists:  {what}");
    }
}
