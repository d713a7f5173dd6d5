//! Named SQLite connections and the scope guard that retargets the default.
//!
//! `Connections` is an explicit context value threaded through the runner.
//! Its "default" is the connection an action without a `@connection`
//! directive runs against. `Connections::using` swaps the default for the
//! duration of a closure through a [`ConnectionScope`], whose `Drop` puts the
//! previous default back. The guard is constructed before the closure runs,
//! so the restore fires on `Ok`, on `Err`, and while unwinding from a panic.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::Config;
use crate::error::{ActionsError, Result};
use crate::paths;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a SQLite database, creating parent directories for file paths.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = if path == Path::new(":memory:") {
        Connection::open_in_memory()?
    } else {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        Connection::open(path)?
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Registry of named connections plus the current default.
pub struct Connections {
    paths: HashMap<String, PathBuf>,
    open: HashMap<String, Connection>,
    default: String,
}

impl Connections {
    /// An empty set whose default is `default`. Add connections with
    /// [`Connections::add`] or [`Connections::register`].
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            paths: HashMap::new(),
            open: HashMap::new(),
            default: default.into(),
        }
    }

    /// Every connection in `config`, opened lazily, with paths resolved
    /// against `root`.
    pub fn from_config(root: &Path, config: &Config) -> Result<Self> {
        let mut connections = Self::new(config.default_connection.clone());
        for (name, conn) in &config.connections {
            connections.add(name.clone(), paths::resolve(root, &conn.path));
        }
        if !connections.contains(&config.default_connection) {
            return Err(ActionsError::UnknownConnection(
                config.default_connection.clone(),
            ));
        }
        Ok(connections)
    }

    /// Replace the default outright (for a `--connection` override at startup).
    pub fn with_default(mut self, name: &str) -> Result<Self> {
        if !self.contains(name) {
            return Err(ActionsError::UnknownConnection(name.to_string()));
        }
        self.default = name.to_string();
        Ok(self)
    }

    /// Configure a connection that is opened on first use.
    pub fn add(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(name.into(), path.into());
    }

    /// Install an already-open handle under `name`.
    pub fn register(&mut self, name: impl Into<String>, conn: Connection) {
        self.open.insert(name.into(), conn);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.open.contains_key(name) || self.paths.contains_key(name)
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Configured path of `name`, if it was added rather than registered.
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    pub fn get(&mut self, name: &str) -> Result<&Connection> {
        match self.open.entry(name.to_string()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let path = self
                    .paths
                    .get(name)
                    .ok_or_else(|| ActionsError::UnknownConnection(name.to_string()))?;
                tracing::debug!(connection = %name, path = %path.display(), "opening connection");
                Ok(e.insert(open_database(path)?))
            }
        }
    }

    /// Handle for the current default connection.
    pub fn current(&mut self) -> Result<&Connection> {
        let name = self.default.clone();
        self.get(&name)
    }

    /// Make `name` the default until the returned guard is dropped.
    pub fn scope(&mut self, name: &str) -> Result<ConnectionScope<'_>> {
        if !self.contains(name) {
            return Err(ActionsError::UnknownConnection(name.to_string()));
        }
        Ok(ConnectionScope::enter(self, name))
    }

    /// Run `work` with `name` as the default connection, then restore the
    /// default that was active on entry. Errors from `work` are returned
    /// unchanged.
    pub fn using<T, F>(&mut self, name: &str, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connections) -> Result<T>,
    {
        let mut scope = self.scope(name)?;
        work(&mut *scope)
    }
}

// ---------------------------------------------------------------------------
// ConnectionScope
// ---------------------------------------------------------------------------

/// Guard holding a temporarily swapped default connection.
///
/// Derefs to the underlying [`Connections`], so scopes nest: an inner scope
/// restores whatever default was active when it was entered.
pub struct ConnectionScope<'a> {
    connections: &'a mut Connections,
    previous: String,
}

impl<'a> ConnectionScope<'a> {
    fn enter(connections: &'a mut Connections, target: &str) -> Self {
        let previous = std::mem::replace(&mut connections.default, target.to_string());
        tracing::debug!(connection = %target, previous = %previous, "entered connection scope");
        Self {
            connections,
            previous,
        }
    }

    /// Default connection that will be restored on drop.
    pub fn previous(&self) -> &str {
        &self.previous
    }
}

impl Deref for ConnectionScope<'_> {
    type Target = Connections;

    fn deref(&self) -> &Connections {
        self.connections
    }
}

impl DerefMut for ConnectionScope<'_> {
    fn deref_mut(&mut self) -> &mut Connections {
        self.connections
    }
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        let left = std::mem::replace(&mut self.connections.default, previous);
        tracing::debug!(
            connection = %left,
            restored = %self.connections.default,
            "left connection scope"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
