pub mod action;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod io;
pub mod ledger;
pub mod paths;
pub mod registry;
pub mod runner;
pub mod scaffold;

pub use action::{Action, SqlAction};
pub use connection::{ConnectionScope, Connections};
pub use error::{ActionsError, Result};
pub use ledger::{Ledger, LedgerEntry, SqliteLedger};
pub use registry::{Catalog, Registry};
pub use runner::{ActionState, ActionStatus, ProjectRunner, Runner};
