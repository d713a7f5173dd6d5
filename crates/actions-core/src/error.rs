use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionsError {
    #[error("not initialized: run 'actions init'")]
    NotInitialized,

    #[error("action already recorded in ledger: {0}")]
    DuplicateEntry(String),

    #[error("no ledger entry for action: {0}")]
    EntryNotFound(String),

    #[error("ledger batch counter exhausted at {0}")]
    BatchOverflow(u32),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("action registered twice: {0}")]
    DuplicateAction(String),

    #[error("action file already exists: {0}")]
    ActionExists(String),

    #[error("invalid action identifier '{0}': expected YYYY_MM_DD_HHMMSS_name")]
    InvalidIdentifier(String),

    #[error("invalid action name '{0}'")]
    InvalidName(String),

    #[error("invalid ledger table name '{0}'")]
    InvalidTable(String),

    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    #[error("malformed action file {path}: {reason}")]
    MalformedAction { path: String, reason: String },

    #[error("action {id} failed")]
    ActionFailed {
        id: String,
        #[source]
        source: Box<ActionsError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl ActionsError {
    /// Identifier of the action whose `apply`/`revert` raised, if any.
    pub fn failed_action(&self) -> Option<&str> {
        match self {
            Self::ActionFailed { id, .. } => Some(id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ActionsError>;
