use super::open_runner;
use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, connection: Option<&str>, json: bool) -> anyhow::Result<()> {
    let runner = open_runner(root, connection)?;
    let status = runner.status().context("failed to read ledger")?;

    if json {
        return print_json(&status);
    }
    if status.is_empty() {
        println!("No actions found.");
        return Ok(());
    }

    let rows = status
        .iter()
        .map(|s| {
            vec![
                s.identifier.clone(),
                s.state.as_str().to_string(),
                s.batch.map(|b| b.to_string()).unwrap_or_default(),
                s.connection.clone().unwrap_or_default(),
                s.applied_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ACTION", "STATE", "BATCH", "CONNECTION", "APPLIED AT"], rows);
    Ok(())
}
