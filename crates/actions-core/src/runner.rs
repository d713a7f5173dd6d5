//! Orchestration: pending set, ordered execution, batch rollback.
//!
//! The runner composes three capabilities: [`Connections`] for routing,
//! a [`Ledger`] for what has been applied, and a [`Registry`] for what
//! exists. Each action is its own unit: a failure halts the current run or
//! rollback, and everything recorded before it stays recorded.
//!
//! When a transactional action runs against the ledger's own database, its
//! work and its ledger write commit in one transaction. Other actions commit
//! first and are recorded right after.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::action::Action;
use crate::config::Config;
use crate::connection::Connections;
use crate::discovery;
use crate::error::{ActionsError, Result};
use crate::ledger::{Ledger, LedgerEntry, SqliteLedger};
use crate::registry::{Catalog, Registry};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Registered, not in the ledger.
    Pending,
    /// Recorded in the ledger.
    Applied,
    /// Recorded in the ledger, but no longer registered.
    Missing,
}

impl ActionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionStatus {
    pub identifier: String,
    pub state: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum Direction {
    Apply,
    Revert,
}

pub struct Runner<L: Ledger, R: Registry> {
    connections: Connections,
    ledger: L,
    registry: R,
}

/// The runner a project directory gets: SQLite ledger, file-discovered actions.
pub type ProjectRunner = Runner<SqliteLedger, Catalog>;

impl ProjectRunner {
    /// Build the runner for `root`. The ledger table lives in the default
    /// connection's database; `connection` overrides that default.
    pub fn open(root: &Path, config: &Config, connection: Option<&str>) -> Result<Self> {
        let mut connections = Connections::from_config(root, config)?;
        if let Some(name) = connection {
            connections = connections.with_default(name)?;
        }
        let default = connections.default_name().to_string();
        let ledger_path = connections
            .path_of(&default)
            .ok_or(ActionsError::UnknownConnection(default.clone()))?
            .to_path_buf();
        let ledger = SqliteLedger::open_path(&ledger_path, &config.table)?;
        let registry = discovery::discover(&config.actions_path(root))?;
        tracing::debug!(
            connection = %default,
            ledger = %ledger_path.display(),
            actions = registry.len(),
            "opened runner"
        );
        Ok(Self::new(connections, ledger, registry))
    }
}

impl<L: Ledger, R: Registry> Runner<L, R> {
    pub fn new(connections: Connections, ledger: L, registry: R) -> Self {
        Self {
            connections,
            ledger,
            registry,
        }
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Registered actions absent from the ledger, ascending.
    pub fn pending(&self) -> Result<Vec<&dyn Action>> {
        pending_in(&self.ledger, &self.registry)
    }

    /// Apply every pending action as one new batch. Returns the applied
    /// identifiers in application order; empty when nothing was pending.
    pub fn run(&mut self) -> Result<Vec<String>> {
        let pending = pending_in(&self.ledger, &self.registry)?;
        if pending.is_empty() {
            tracing::info!("nothing to run");
            return Ok(Vec::new());
        }

        let last = self.ledger.last_batch()?;
        let batch = last.checked_add(1).ok_or(ActionsError::BatchOverflow(last))?;
        let mut applied = Vec::with_capacity(pending.len());
        for action in pending {
            let shared = shares_ledger(&self.connections, &self.ledger, action);
            let ledger = &self.ledger;
            let record = |conn: &Connection| ledger.record_on(conn, action.id(), batch);
            let alongside: Option<&dyn Fn(&Connection) -> Result<()>> =
                if shared { Some(&record) } else { None };
            if let Err(e) = execute(&mut self.connections, action, Direction::Apply, alongside) {
                tracing::error!(action = %action.id(), batch, applied = applied.len(), "run halted");
                return Err(e);
            }
            if !shared {
                self.ledger.record(action.id(), batch)?;
            }
            tracing::info!(
                action = %action.id(),
                batch,
                connection = action.connection().unwrap_or(self.connections.default_name()),
                "applied"
            );
            applied.push(action.id().to_string());
        }
        Ok(applied)
    }

    /// Revert the most recent batch. Returns reverted identifiers, newest first.
    pub fn rollback(&mut self) -> Result<Vec<String>> {
        self.rollback_steps(1)
    }

    /// Revert the most recent `steps` batches, newest first.
    pub fn rollback_steps(&mut self, steps: u32) -> Result<Vec<String>> {
        let mut reverted = Vec::new();
        for _ in 0..steps {
            let batch = self.ledger.last_batch()?;
            if batch == 0 {
                break;
            }
            self.revert_batch(batch, &mut reverted)?;
        }
        if reverted.is_empty() {
            tracing::info!("nothing to roll back");
        }
        Ok(reverted)
    }

    /// Revert every batch.
    pub fn reset(&mut self) -> Result<Vec<String>> {
        let mut reverted = Vec::new();
        loop {
            let batch = self.ledger.last_batch()?;
            if batch == 0 {
                break;
            }
            self.revert_batch(batch, &mut reverted)?;
        }
        Ok(reverted)
    }

    fn revert_batch(&mut self, batch: u32, reverted: &mut Vec<String>) -> Result<()> {
        for id in self.ledger.entries_in_batch(batch)? {
            let action = self.registry.find(&id)?;
            let shared = shares_ledger(&self.connections, &self.ledger, action);
            let ledger = &self.ledger;
            let remove = |conn: &Connection| ledger.remove_on(conn, action.id());
            let alongside: Option<&dyn Fn(&Connection) -> Result<()>> =
                if shared { Some(&remove) } else { None };
            if let Err(e) = execute(&mut self.connections, action, Direction::Revert, alongside) {
                tracing::error!(action = %id, batch, reverted = reverted.len(), "rollback halted");
                return Err(e);
            }
            if !shared {
                self.ledger.remove(&id)?;
            }
            tracing::info!(action = %id, batch, "reverted");
            reverted.push(id);
        }
        Ok(())
    }

    /// Every registered action with its ledger state, plus ledger entries
    /// whose action has disappeared. Sorted by identifier.
    pub fn status(&self) -> Result<Vec<ActionStatus>> {
        let mut recorded: HashMap<String, LedgerEntry> = self
            .ledger
            .entries()?
            .into_iter()
            .map(|e| (e.identifier.clone(), e))
            .collect();

        let mut rows: Vec<ActionStatus> = self
            .registry
            .all()
            .into_iter()
            .map(|action| {
                let entry = recorded.remove(action.id());
                ActionStatus {
                    identifier: action.id().to_string(),
                    state: if entry.is_some() {
                        ActionState::Applied
                    } else {
                        ActionState::Pending
                    },
                    connection: action.connection().map(str::to_string),
                    batch: entry.as_ref().map(|e| e.batch),
                    applied_at: entry.map(|e| e.applied_at),
                }
            })
            .collect();

        rows.extend(recorded.into_values().map(|e| ActionStatus {
            identifier: e.identifier,
            state: ActionState::Missing,
            connection: None,
            batch: Some(e.batch),
            applied_at: Some(e.applied_at),
        }));
        rows.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(rows)
    }

    /// Run `work` against `name` as the default connection, restoring the
    /// previous default afterwards.
    pub fn using_connection<T, F>(&mut self, name: &str, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connections) -> Result<T>,
    {
        self.connections.using(name, work)
    }
}

fn pending_in<'r, L: Ledger, R: Registry>(ledger: &L, registry: &'r R) -> Result<Vec<&'r dyn Action>> {
    let mut pending = Vec::new();
    for action in registry.all() {
        if !ledger.has(action.id())? {
            pending.push(action);
        }
    }
    Ok(pending)
}

/// Whether `action` targets the database the ledger lives in, so its work
/// and its ledger write can commit as one transaction.
fn shares_ledger<L: Ledger>(connections: &Connections, ledger: &L, action: &dyn Action) -> bool {
    if !action.is_transactional() {
        return false;
    }
    let target = action.connection().unwrap_or(connections.default_name());
    match (ledger.location(), connections.path_of(target)) {
        (Some(ledger_db), Some(target_db)) => ledger_db == target_db,
        _ => false,
    }
}

fn failed(action: &dyn Action, source: ActionsError) -> ActionsError {
    ActionsError::ActionFailed {
        id: action.id().to_string(),
        source: Box::new(source),
    }
}

/// Run one direction of `action`, inside a connection scope when it names one.
///
/// `alongside` runs on the same handle after the action's work, inside one
/// transaction with it; its errors are returned unwrapped.
fn execute(
    connections: &mut Connections,
    action: &dyn Action,
    direction: Direction,
    alongside: Option<&dyn Fn(&Connection) -> Result<()>>,
) -> Result<()> {
    let run = |conn: &Connection| match direction {
        Direction::Apply => action.apply(conn),
        Direction::Revert => action.revert(conn),
    };
    let work = |conns: &mut Connections| -> Result<()> {
        let conn = conns.current().map_err(|e| failed(action, e))?;
        let Some(alongside) = alongside else {
            return run(conn).map_err(|e| failed(action, e));
        };
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| failed(action, e.into()))?;
        run(&*tx).map_err(|e| failed(action, e))?;
        alongside(&*tx)?;
        tx.commit().map_err(|e| failed(action, e.into()))
    };
    match action.connection() {
        Some(name) if !connections.contains(name) => Err(failed(
            action,
            ActionsError::UnknownConnection(name.to_string()),
        )),
        Some(name) => connections.using(name, work),
        None => work(connections),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
