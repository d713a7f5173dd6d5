use crate::action::Action;
use crate::error::{ActionsError, Result};
use crate::paths;

/// Read-only, ordered catalog of known actions.
pub trait Registry {
    /// Every action, ascending by identifier.
    fn all(&self) -> Vec<&dyn Action>;

    fn find(&self, identifier: &str) -> Result<&dyn Action>;
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// In-memory registry. Actions are sorted on construction, so callers may
/// hand them over in any order.
#[derive(Default)]
pub struct Catalog {
    actions: Vec<Box<dyn Action>>,
}

impl Catalog {
    pub fn new(mut actions: Vec<Box<dyn Action>>) -> Result<Self> {
        for action in &actions {
            paths::validate_identifier(action.id())?;
        }
        actions.sort_by(|a, b| a.id().cmp(b.id()));
        if let Some(pair) = actions.windows(2).find(|w| w[0].id() == w[1].id()) {
            return Err(ActionsError::DuplicateAction(pair[0].id().to_string()));
        }
        Ok(Self { actions })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Registry for Catalog {
    fn all(&self) -> Vec<&dyn Action> {
        self.actions.iter().map(|a| a.as_ref()).collect()
    }

    fn find(&self, identifier: &str) -> Result<&dyn Action> {
        self.actions
            .binary_search_by(|a| a.id().cmp(identifier))
            .map(|i| self.actions[i].as_ref())
            .map_err(|_| ActionsError::ActionNotFound(identifier.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
