use crate::error::{ActionsError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// A named SQLite database the runner can target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database file, relative to the project root, or `:memory:`.
    pub path: String,
}

impl ConnectionConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub default_connection: String,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    /// Ledger table, created in the default connection's database.
    #[serde(default = "default_table")]
    pub table: String,
    /// Directory scanned for action files, relative to the project root.
    #[serde(default = "default_actions_dir")]
    pub actions_dir: String,
}

fn default_version() -> u32 {
    1
}

fn default_table() -> String {
    "action_ledger".to_string()
}

fn default_actions_dir() -> String {
    paths::DEFAULT_ACTIONS_SOURCE_DIR.to_string()
}

impl Config {
    /// A single-connection config pointing `main` at `database/main.sqlite`.
    pub fn new() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(
            "main".to_string(),
            ConnectionConfig::new("database/main.sqlite"),
        );
        Self {
            version: default_version(),
            default_connection: "main".to_string(),
            connections,
            table: default_table(),
            actions_dir: default_actions_dir(),
        }
    }

    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| ActionsError::UnknownConnection(name.to_string()))
    }

    pub fn actions_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.actions_dir)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(ActionsError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.connections.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "no connections configured".to_string(),
            });
        } else if !self.connections.contains_key(&self.default_connection) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "default_connection '{}' is not listed under connections",
                    self.default_connection
                ),
            });
        }

        for (name, conn) in &self.connections {
            if conn.path.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("connection '{name}' has an empty path"),
                });
            } else if conn.path == ":memory:" {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "connection '{name}' is in-memory; its data and ledger do not survive the process"
                    ),
                });
            }
        }

        if paths::validate_table(&self.table).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("table '{}' is not a valid SQL identifier", self.table),
            });
        }

        warnings
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.default_connection, "main");
        assert_eq!(parsed.table, "action_ledger");
        assert_eq!(parsed.actions_dir, "actions");
        assert_eq!(parsed.connections.len(), 1);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let yaml = r#"
default_connection: main
connections:
  main:
    path: main.sqlite
  audit:
    path: /var/lib/audit.sqlite
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.table, "action_ledger");
        assert_eq!(cfg.connection("audit").unwrap().path, "/var/lib/audit.sqlite");
        assert!(matches!(
            cfg.connection("missing"),
            Err(ActionsError::UnknownConnection(_))
        ));
    }

    #[test]
    fn load_missing_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(ActionsError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new();
        cfg.table = "data_actions".to_string();
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.table, "data_actions");
    }

    #[test]
    fn validate_valid_config_no_warnings() {
        assert!(Config::new().validate().is_empty());
    }

    #[test]
    fn validate_unknown_default_connection() {
        let mut cfg = Config::new();
        cfg.default_connection = "primary".to_string();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
        assert!(warnings[0].message.contains("primary"));
    }

    #[test]
    fn validate_bad_table_and_empty_path() {
        let mut cfg = Config::new();
        cfg.table = "bad table".to_string();
        cfg.connections
            .insert("other".to_string(), ConnectionConfig::new(" "));
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Error));
    }

    #[test]
    fn validate_memory_connection_warns() {
        let mut cfg = Config::new();
        cfg.connections
            .insert("scratch".to_string(), ConnectionConfig::new(":memory:"));
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }
}
