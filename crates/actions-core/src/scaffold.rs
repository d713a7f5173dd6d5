//! `make <name>`: scaffold a new, empty action file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{ActionsError, Result};
use crate::{io, paths};

/// Convert a human or CamelCase name into the identifier slug.
///
/// `MakeExample` → `make_example`, `seed users` → `seed_users`,
/// `HTTPCache-warmup` → `http_cache_warmup`.
pub fn action_slug(name: &str) -> Result<String> {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut slug = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
                let boundary = prev.is_ascii_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_ascii_uppercase() && next_lower);
                if boundary && !slug.ends_with('_') {
                    slug.push('_');
                }
            }
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_').to_string();
    if slug.is_empty() {
        return Err(ActionsError::InvalidName(name.to_string()));
    }
    Ok(slug)
}

pub fn identifier_for(name: &str, now: DateTime<Utc>) -> Result<String> {
    let id = format!("{}_{}", now.format("%Y_%m_%d_%H%M%S"), action_slug(name)?);
    paths::validate_identifier(&id)?;
    Ok(id)
}

/// Body of a freshly scaffolded action file.
pub fn render(identifier: &str) -> String {
    format!(
        "-- {identifier}\n\
         --\n\
         -- Runs once per database. To target a connection other than the\n\
         -- default, add a \"-- @connection <name>\" line above the up section.\n\
         \n\
         -- @up\n\
         \n\
         \n\
         -- @down\n\
         \n"
    )
}

/// Write a new action file into `dir`. Never overwrites.
pub fn make_action(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let identifier = identifier_for(name, now)?;
    let path = paths::action_file(dir, &identifier);
    if !io::write_if_missing(&path, render(&identifier).as_bytes())? {
        return Err(ActionsError::ActionExists(path.display().to_string()));
    }
    tracing::info!(action = %identifier, path = %path.display(), "created action");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, SqlAction};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn slugs() {
        for (name, expected) in [
            ("MakeExample", "make_example"),
            ("  MakeExample  ", "make_example"),
            ("seed users", "seed_users"),
            ("HTTPCache-warmup", "http_cache_warmup"),
            ("backfill2FAFlags", "backfill2_fa_flags"),
            ("already_snake", "already_snake"),
            ("--weird--", "weird"),
        ] {
            assert_eq!(action_slug(name).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn empty_name_rejected() {
        for name in ["", "   ", "---"] {
            assert!(matches!(
                action_slug(name),
                Err(ActionsError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn identifier_uses_timestamp_prefix() {
        assert_eq!(
            identifier_for("MakeExample", fixed_now()).unwrap(),
            "2024_03_09_140507_make_example"
        );
    }

    #[test]
    fn make_action_writes_template() {
        let dir = TempDir::new().unwrap();
        let actions = dir.path().join("actions");
        let path = make_action(&actions, "MakeExample", fixed_now()).unwrap();

        assert_eq!(path, actions.join("2024_03_09_140507_make_example.sql"));
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body, render("2024_03_09_140507_make_example"));
        assert!(body.starts_with("-- 2024_03_09_140507_make_example\n"));
    }

    #[test]
    fn scaffolded_file_parses_as_noop_action() {
        let dir = TempDir::new().unwrap();
        let path = make_action(dir.path(), "seed users", fixed_now()).unwrap();
        let action = SqlAction::from_file(&path).unwrap();
        assert_eq!(action.id(), "2024_03_09_140507_seed_users");
        assert_eq!(action.connection(), None);
        assert!(action.up_sql().trim().is_empty());
    }

    #[test]
    fn make_action_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        make_action(dir.path(), "MakeExample", fixed_now()).unwrap();
        assert!(matches!(
            make_action(dir.path(), "make example", fixed_now()),
            Err(ActionsError::ActionExists(_))
        ));
    }
}
