//! Filesystem discovery of `.sql` action files.

use std::path::{Path, PathBuf};

use crate::action::{Action, SqlAction};
use crate::error::Result;
use crate::paths::ACTION_EXTENSION;
use crate::registry::Catalog;

/// Action files directly inside `dir`, sorted by file name.
pub fn action_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ACTION_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse every action file in `dir` into a [`Catalog`]. A missing directory
/// is an empty catalog.
pub fn discover(dir: &Path) -> Result<Catalog> {
    let mut actions: Vec<Box<dyn Action>> = Vec::new();
    for path in action_files(dir)? {
        actions.push(Box::new(SqlAction::from_file(&path)?));
    }
    tracing::debug!(dir = %dir.display(), count = actions.len(), "discovered actions");
    Catalog::new(actions)
}
