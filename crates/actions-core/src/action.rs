//! Action definitions.
//!
//! An `Action` is a one-time unit of data-mutating work with a forward
//! (`apply`) and backward (`revert`) operation. The runner decides which
//! connection each operation receives; an action only declares, through
//! `connection()`, that it must run somewhere other than the default.
//!
//! `SqlAction` is the file-backed form:
//!
//! ```text
//! -- @connection audit      (optional)
//! -- @transaction off       (optional, default on)
//! -- @up
//! INSERT INTO ...;
//! -- @down
//! DELETE FROM ...;
//! ```
//!
//! Header directives must precede `@up`. Inside the bodies any `-- @word`
//! line other than `@up`, `@down`, `@connection` or `@transaction` is an
//! ordinary SQL comment.

use std::path::Path;

use rusqlite::Connection;

use crate::error::{ActionsError, Result};
use crate::paths;

pub trait Action {
    /// Unique, chronologically sortable identifier.
    fn id(&self) -> &str;

    /// Alternate connection this action must run against.
    fn connection(&self) -> Option<&str> {
        None
    }

    /// Whether `apply`/`revert` are all-or-nothing. Only such actions are
    /// recorded in the same transaction as their work.
    fn is_transactional(&self) -> bool {
        true
    }

    fn apply(&self, conn: &Connection) -> Result<()>;

    fn revert(&self, conn: &Connection) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SqlAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SqlAction {
    id: String,
    connection: Option<String>,
    transactional: bool,
    up: String,
    down: String,
}

impl SqlAction {
    pub fn new(id: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Result<Self> {
        let id = id.into();
        paths::validate_identifier(&id)?;
        Ok(Self {
            id,
            connection: None,
            transactional: true,
            up: up.into(),
            down: down.into(),
        })
    }

    pub fn on_connection(mut self, name: impl Into<String>) -> Self {
        self.connection = Some(name.into());
        self
    }

    pub fn without_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    pub fn up_sql(&self) -> &str {
        &self.up
    }

    pub fn down_sql(&self) -> &str {
        &self.down
    }

    /// Parse an action body. `id` comes from the file name.
    pub fn parse(id: &str, source: &str) -> Result<Self> {
        paths::validate_identifier(id)?;
        parse_source(id, source).map_err(|reason| ActionsError::MalformedAction {
            path: id.to_string(),
            reason,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if paths::validate_identifier(&id).is_err() {
            return Err(ActionsError::MalformedAction {
                path: path.display().to_string(),
                reason: format!("'{id}' is not a valid action identifier"),
            });
        }
        let source = std::fs::read_to_string(path)?;
        parse_source(&id, &source).map_err(|reason| ActionsError::MalformedAction {
            path: path.display().to_string(),
            reason,
        })
    }

    fn execute(&self, conn: &Connection, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Ok(());
        }
        // An open transaction on `conn` belongs to the caller; join it.
        if self.transactional && conn.is_autocommit() {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.commit()?;
        } else {
            conn.execute_batch(sql)?;
        }
        Ok(())
    }
}

impl Action for SqlAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    fn is_transactional(&self) -> bool {
        self.transactional
    }

    fn apply(&self, conn: &Connection) -> Result<()> {
        self.execute(conn, &self.up)
    }

    fn revert(&self, conn: &Connection) -> Result<()> {
        self.execute(conn, &self.down)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// `-- @name args` → `Some(("name", "args"))`.
fn directive(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix("--")?.trim_start();
    let rest = rest.strip_prefix('@')?;
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    Some((name, args.trim()))
}

fn parse_source(id: &str, source: &str) -> std::result::Result<SqlAction, String> {
    let mut action = SqlAction {
        id: id.to_string(),
        connection: None,
        transactional: true,
        up: String::new(),
        down: String::new(),
    };
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut section = Section::Preamble;
    let mut seen_up = false;
    let mut seen_down = false;

    for (n, line) in source.lines().enumerate() {
        let lineno = n + 1;
        let parsed = directive(line).filter(|(name, _)| {
            section == Section::Preamble
                || matches!(*name, "up" | "down" | "connection" | "transaction")
        });
        if let Some((name, args)) = parsed {
            match name {
                "up" if seen_up => return Err(format!("line {lineno}: duplicate @up")),
                "up" => {
                    seen_up = true;
                    section = Section::Up;
                }
                "down" if seen_down => return Err(format!("line {lineno}: duplicate @down")),
                "down" => {
                    seen_down = true;
                    section = Section::Down;
                }
                "connection" if section != Section::Preamble => {
                    return Err(format!("line {lineno}: @connection must precede @up"))
                }
                "connection" if args.is_empty() || args.contains(char::is_whitespace) => {
                    return Err(format!("line {lineno}: @connection needs one name"))
                }
                "connection" => action.connection = Some(args.to_string()),
                "transaction" if section != Section::Preamble => {
                    return Err(format!("line {lineno}: @transaction must precede @up"))
                }
                "transaction" => match args {
                    "on" => action.transactional = true,
                    "off" => action.transactional = false,
                    other => {
                        return Err(format!(
                            "line {lineno}: @transaction expects on|off, got '{other}'"
                        ))
                    }
                },
                other => return Err(format!("line {lineno}: unknown directive @{other}")),
            }
            continue;
        }

        match section {
            Section::Preamble => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with("--") {
                    return Err(format!("line {lineno}: SQL before @up"));
                }
            }
            Section::Up => {
                action.up.push_str(line);
                action.up.push('\n');
            }
            Section::Down => {
                action.down.push_str(line);
                action.down.push('\n');
            }
        }
    }

    if !seen_up {
        return Err("missing @up section".to_string());
    }
    Ok(action)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
