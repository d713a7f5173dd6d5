//! `run` / `rollback` / `reset` / `refresh`: thin calls into the runner.

use super::open_runner;
use crate::output::{print_ids, print_json};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, connection: Option<&str>, pretend: bool, json: bool) -> anyhow::Result<()> {
    let mut runner = open_runner(root, connection)?;

    if pretend {
        let pending: Vec<String> = runner
            .pending()
            .context("failed to compute pending actions")?
            .into_iter()
            .map(|a| a.id().to_string())
            .collect();
        if json {
            print_json(&serde_json::json!({ "pending": pending }))?;
        } else {
            print_ids("Would apply", &pending, "Nothing to run.");
        }
        return Ok(());
    }

    let applied = runner.run().context("run failed")?;
    if json {
        print_json(&serde_json::json!({ "applied": applied }))?;
    } else {
        print_ids("Applied", &applied, "Nothing to run.");
    }
    Ok(())
}

pub fn rollback(root: &Path, connection: Option<&str>, step: u32, json: bool) -> anyhow::Result<()> {
    if step == 0 {
        anyhow::bail!("--step must be at least 1");
    }
    let mut runner = open_runner(root, connection)?;
    let reverted = runner.rollback_steps(step).context("rollback failed")?;
    if json {
        print_json(&serde_json::json!({ "reverted": reverted }))?;
    } else {
        print_ids("Reverted", &reverted, "Nothing to roll back.");
    }
    Ok(())
}

pub fn reset(root: &Path, connection: Option<&str>, json: bool) -> anyhow::Result<()> {
    let mut runner = open_runner(root, connection)?;
    let reverted = runner.reset().context("reset failed")?;
    if json {
        print_json(&serde_json::json!({ "reverted": reverted }))?;
    } else {
        print_ids("Reverted", &reverted, "Nothing to roll back.");
    }
    Ok(())
}

pub fn refresh(root: &Path, connection: Option<&str>, json: bool) -> anyhow::Result<()> {
    let mut runner = open_runner(root, connection)?;
    let reverted = runner.reset().context("reset failed")?;
    let applied = runner.run().context("run failed")?;
    if json {
        print_json(&serde_json::json!({ "reverted": reverted, "applied": applied }))?;
    } else {
        print_ids("Reverted", &reverted, "Nothing to roll back.");
        print_ids("Applied", &applied, "Nothing to run.");
    }
    Ok(())
}
