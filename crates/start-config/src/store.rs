use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use toml::Value;

use start_core::{keys, Config, StartError};

use crate::validate::validate_config;

/// Read the items under a scope file's top-level key. A missing file is an
/// empty table.
pub fn read_scope_file(scope_dir: &Path, key: &str) -> Result<toml::value::Table> {
    let path = scope_file_path(scope_dir, key);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Ok(toml::value::Table::new());
    };
    let value: Value = content
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(value
        .get(key)
        .and_then(Value::as_table)
        .cloned()
        .unwrap_or_default())
}

pub fn scope_file_path(scope_dir: &Path, key: &str) -> PathBuf {
    scope_dir.join(format!("{}.toml", keys::file_stem(key)))
}

/// Insert or replace one asset entry in its scope file and regenerate the
/// file from the template. The new content is validated before it replaces
/// the old file; a validation failure leaves the original untouched.
pub fn write_asset(scope_dir: &Path, key: &str, name: &str, asset: Value) -> Result<PathBuf> {
    let mut items = read_scope_file(scope_dir, key)?;
    items.insert(name.to_string(), asset);
    regenerate(scope_dir, key, items)
}

/// Remove one asset entry; returns false when the entry was not present.
pub fn remove_asset(scope_dir: &Path, key: &str, name: &str) -> Result<bool> {
    let mut items = read_scope_file(scope_dir, key)?;
    if items.remove(name).is_none() {
        return Ok(false);
    }
    regenerate(scope_dir, key, items)?;
    Ok(true)
}

/// Set one field of the settings record, regenerating `settings.toml`.
pub fn write_settings_field(scope_dir: &Path, field: &str, value: Value) -> Result<PathBuf> {
    let mut record = read_scope_file(scope_dir, keys::SETTINGS)?;
    record.insert(field.to_string(), value);
    regenerate(scope_dir, keys::SETTINGS, record)
}

/// Render a whole scope file from its in-memory items. No AST surgery: the
/// file is always regenerated from the template.
fn regenerate(scope_dir: &Path, key: &str, items: toml::value::Table) -> Result<PathBuf> {
    let path = scope_file_path(scope_dir, key);
    let content = render(key, items)?;
    validate_content(&path, key, &content)?;

    std::fs::create_dir_all(scope_dir)
        .with_context(|| format!("failed to create {}", scope_dir.display()))?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, &content)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(path)
}

fn render(key: &str, items: toml::value::Table) -> Result<String> {
    let mut root = toml::value::Table::new();
    root.insert(key.to_string(), Value::Table(items));
    let body = toml::to_string_pretty(&Value::Table(root))
        .with_context(|| format!("failed to render {key} file"))?;
    Ok(format!(
        "# Managed by start; regenerated on every change.\n\n{body}"
    ))
}

/// Re-parse the rendered content and run the constraint checks so a bad
/// asset never lands on disk.
fn validate_content(path: &Path, key: &str, content: &str) -> Result<()> {
    let value: Value = content
        .parse()
        .with_context(|| format!("regenerated {} does not parse", path.display()))?;

    let top_keys: Vec<&str> = value
        .as_table()
        .map(|t| t.keys().map(String::as_str).collect())
        .unwrap_or_default();
    if top_keys != [key] {
        return Err(StartError::ConfigConflict(format!(
            "regenerated {} must contain exactly the top-level key '{key}'",
            path.display()
        ))
        .into());
    }

    let config = Config::from_value(value)
        .map_err(|e| StartError::ConfigConflict(format!("{}: {e}", path.display())))?;
    let issues = validate_config(&config);
    if let Some(issue) = issues.first() {
        return Err(StartError::Validation {
            entity: issue.entity.clone(),
            reason: issue.problem.clone(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn asset(raw: &str) -> Value {
        raw.parse().unwrap()
    }

    #[test]
    fn write_then_read_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = write_asset(
            tmp.path(),
            keys::ROLES,
            "assistant",
            asset("prompt = \"You are helpful.\"\ntags = [\"general\"]\n"),
        )
        .unwrap();
        assert!(path.ends_with("roles.toml"));

        let items = read_scope_file(tmp.path(), keys::ROLES).unwrap();
        assert_eq!(
            items["assistant"]["prompt"].as_str().unwrap(),
            "You are helpful."
        );

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Managed by start"));
    }

    #[test]
    fn write_preserves_other_entries() {
        let tmp = TempDir::new().unwrap();
        write_asset(tmp.path(), keys::ROLES, "one", asset("prompt = \"1\"\n")).unwrap();
        write_asset(tmp.path(), keys::ROLES, "two", asset("prompt = \"2\"\n")).unwrap();

        let items = read_scope_file(tmp.path(), keys::ROLES).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn invalid_asset_rolls_back() {
        let tmp = TempDir::new().unwrap();
        write_asset(
            tmp.path(),
            keys::AGENTS,
            "claude",
            asset("command = \"claude -p {{.prompt}}\"\n"),
        )
        .unwrap();

        // Empty command violates the non-empty constraint; the original file
        // must survive untouched.
        let err = write_asset(tmp.path(), keys::AGENTS, "bad", asset("command = \"\"\n"));
        assert!(err.is_err());

        let items = read_scope_file(tmp.path(), keys::AGENTS).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items.contains_key("claude"));
    }

    #[test]
    fn remove_missing_returns_false() {
        let tmp = TempDir::new().unwrap();
        assert!(!remove_asset(tmp.path(), keys::ROLES, "ghost").unwrap());

        write_asset(tmp.path(), keys::ROLES, "real", asset("prompt = \"x\"\n")).unwrap();
        assert!(remove_asset(tmp.path(), keys::ROLES, "real").unwrap());
        let items = read_scope_file(tmp.path(), keys::ROLES).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn settings_field_update_keeps_record() {
        let tmp = TempDir::new().unwrap();
        write_settings_field(tmp.path(), "default_agent", Value::String("claude".into()))
            .unwrap();
        write_settings_field(tmp.path(), "timeout", Value::Integer(60)).unwrap();

        let record = read_scope_file(tmp.path(), keys::SETTINGS).unwrap();
        assert_eq!(record["default_agent"].as_str().unwrap(), "claude");
        assert_eq!(record["timeout"].as_integer().unwrap(), 60);
    }
}
