use crate::error::{ActionsError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ACTIONS_DIR: &str = ".actions";
pub const CONFIG_FILE: &str = ".actions/config.yaml";

pub const DEFAULT_ACTIONS_SOURCE_DIR: &str = "actions";
pub const ACTION_EXTENSION: &str = "sql";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn actions_dir(root: &Path) -> PathBuf {
    root.join(ACTIONS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured path against the project root. Absolute paths and
/// SQLite's `:memory:` are returned as-is.
pub fn resolve(root: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if configured == ":memory:" || p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

pub fn action_file(dir: &Path, identifier: &str) -> PathBuf {
    dir.join(format!("{identifier}.{ACTION_EXTENSION}"))
}

// ---------------------------------------------------------------------------
// Identifier / table validation
// ---------------------------------------------------------------------------

static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();
static TABLE_RE: OnceLock<Regex> = OnceLock::new();

fn identifier_re() -> &'static Regex {
    IDENTIFIER_RE
        .get_or_init(|| Regex::new(r"^\d{4}_\d{2}_\d{2}_\d{6}_[a-z0-9]+(_[a-z0-9]+)*$").unwrap())
}

fn table_re() -> &'static Regex {
    TABLE_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Action identifiers sort chronologically because they start with a
/// zero-padded timestamp.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.len() > 128 || !identifier_re().is_match(identifier) {
        return Err(ActionsError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

/// The ledger table name is interpolated into SQL, so only plain identifiers pass.
pub fn validate_table(table: &str) -> Result<()> {
    if table.len() > 64 || !table_re().is_match(table) {
        return Err(ActionsError::InvalidTable(table.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_identifiers() {
        for id in [
            "2024_01_01_000000_create_x",
            "2024_01_02_000000_seed_x",
            "2023_12_31_235959_a",
            "2024_06_15_101010_backfill_2fa_flags",
        ] {
            validate_identifier(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_identifiers() {
        for id in [
            "",
            "create_x",
            "2024_01_01_create_x",
            "2024_01_01_000000_",
            "2024_01_01_000000_Create",
            "2024_01_01_000000_has space",
            "2024_01_01_000000_trailing_",
            "2024-01-01_000000_x",
        ] {
            assert!(validate_identifier(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn table_names() {
        validate_table("action_ledger").unwrap();
        validate_table("_actions2").unwrap();
        assert!(validate_table("").is_err());
        assert!(validate_table("ledger; DROP TABLE x").is_err());
        assert!(validate_table("2ledger").is_err());
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.actions/config.yaml")
        );
        assert_eq!(
            action_file(&root.join("actions"), "2024_01_01_000000_create_x"),
            PathBuf::from("/tmp/proj/actions/2024_01_01_000000_create_x.sql")
        );
        assert_eq!(
            resolve(root, "data/main.sqlite"),
            PathBuf::from("/tmp/proj/data/main.sqlite")
        );
        assert_eq!(resolve(root, "/var/db.sqlite"), PathBuf::from("/var/db.sqlite"));
        assert_eq!(resolve(root, ":memory:"), PathBuf::from(":memory:"));
    }
}
