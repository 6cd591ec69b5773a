use anyhow::Result;
use std::path::{Path, PathBuf};
use toml::Value;
use tracing::debug;

use start_core::{keys, Config, StartError};

use crate::merge::merge_scopes;

/// Result of loading the ordered scope directories.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Raw merged value, used by doctor and the scope-file writer.
    pub raw: Value,
    /// Typed projection of `raw`.
    pub config: Config,
    pub global_loaded: bool,
    pub local_loaded: bool,
}

/// Load the global and local scopes and merge them (local overrides global).
/// Missing directories and directories without configuration files are
/// silently skipped.
pub fn load(global: Option<&Path>, local: Option<&Path>) -> Result<LoadedConfig> {
    let dirs: Vec<PathBuf> = [global, local]
        .iter()
        .flatten()
        .map(|p| p.to_path_buf())
        .collect();
    let (raw, loaded) = load_dirs(&dirs)?;

    let mut flags = loaded.into_iter();
    let global_loaded = global.is_some() && flags.next().unwrap_or(false);
    let local_loaded = local.is_some() && flags.next().unwrap_or(false);

    let config = Config::from_value(raw.clone())
        .map_err(|e| StartError::ConfigConflict(format!("configuration shape: {e}")))?;

    Ok(LoadedConfig {
        raw,
        config,
        global_loaded,
        local_loaded,
    })
}

/// Load an ordered list of directories as independent units and merge them
/// left to right. The boolean per directory records whether it contributed
/// any configuration.
pub fn load_dirs(dirs: &[PathBuf]) -> Result<(Value, Vec<bool>)> {
    let mut merged = Value::Table(toml::value::Table::new());
    let mut loaded = Vec::with_capacity(dirs.len());

    for dir in dirs {
        match load_single(dir)? {
            Some(unit) => {
                merged = merge_scopes(merged, unit);
                loaded.push(true);
            }
            None => loaded.push(false),
        }
    }
    Ok((merged, loaded))
}

/// Load one directory as a compilation unit. Returns `Ok(None)` when the
/// directory does not exist or contains no configuration files; a parse
/// failure in any single file fails the whole unit.
pub fn load_single(dir: &Path) -> Result<Option<Value>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "scope directory missing; skipped");
        return Ok(None);
    }

    let mut unit = toml::value::Table::new();
    let mut any = false;

    for key in keys::ALL {
        let path = dir.join(format!("{}.toml", keys::file_stem(key)));
        let Some(table) = load_scope_file(&path, key)? else {
            continue;
        };
        any = true;
        unit.insert((*key).to_string(), table);
    }

    if any {
        Ok(Some(Value::Table(unit)))
    } else {
        Ok(None)
    }
}

/// Read and parse one scope file, enforcing its single-top-level-key shape.
/// Returns the value under the top-level key.
fn load_scope_file(path: &Path, key: &str) -> Result<Option<Value>> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Ok(None);
    };

    let value: Value = content
        .parse()
        .map_err(|e: toml::de::Error| syntax_error(path, &content, &e))?;

    let Value::Table(mut table) = value else {
        return Err(StartError::ConfigConflict(format!(
            "{}: expected a table with the single top-level key '{key}'",
            path.display()
        ))
        .into());
    };

    let mut keys_found: Vec<String> = table.keys().cloned().collect();
    keys_found.retain(|k| k != key);
    if !keys_found.is_empty() {
        return Err(StartError::ConfigConflict(format!(
            "{}: unexpected top-level key(s) {}: each scope file holds exactly one key \
             matching its filename",
            path.display(),
            keys_found.join(", ")
        ))
        .into());
    }

    Ok(table.remove(key))
}

/// Build a `ConfigSyntax` diagnostic with 1-based line/column and a ±2-line
/// source snippet around the failure.
fn syntax_error(path: &Path, content: &str, err: &toml::de::Error) -> StartError {
    let offset = err.span().map(|s| s.start).unwrap_or(0);
    let (line, column) = line_col(content, offset);
    StartError::ConfigSyntax {
        path: path.display().to_string(),
        line,
        column,
        message: err.message().to_string(),
        snippet: snippet(content, line),
    }
}

fn line_col(content: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map(str::len).unwrap_or(0) + 1;
    (line, column)
}

/// Render the failing line with up to two lines of context either side,
/// marking the failing line with `>`.
fn snippet(content: &str, line: usize) -> String {
    let first = line.saturating_sub(3) + 1;
    content
        .lines()
        .enumerate()
        .skip(first - 1)
        .take_while(|(i, _)| i + 1 <= line + 2)
        .map(|(i, text)| {
            let n = i + 1;
            let marker = if n == line { '>' } else { ' ' };
            format!("{marker} {n:>3} | {text}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of compiling one file standalone.
#[derive(Debug)]
pub struct FileDiagnostic {
    pub path: PathBuf,
    /// `Ok` when the file parses on its own; `Err` carries the message.
    pub outcome: Result<(), String>,
}

/// Compile each configuration file in a directory individually. Separates
/// per-file syntax errors from cross-file conflicts when a unit fails to
/// load as a whole.
pub fn diagnose_dir(dir: &Path) -> Vec<FileDiagnostic> {
    let mut results = Vec::new();
    for key in keys::ALL {
        let path = dir.join(format!("{}.toml", keys::file_stem(key)));
        if !path.is_file() {
            continue;
        }
        let outcome = match load_scope_file(&path, key) {
            Ok(_) => Ok(()),
            Err(e) => Err(format!("{e:#}")),
        };
        results.push(FileDiagnostic { path, outcome });
    }
    results
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
