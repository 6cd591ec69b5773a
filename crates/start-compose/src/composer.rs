use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use start_core::{Config, Context, StartError};
use start_template::{resolve, EvalContext};

/// Which contexts to include. The three sources are additive and never
/// mutually exclusive: asking for a tag must not suppress defaults.
#[derive(Debug, Clone, Default)]
pub struct ContextSelection {
    pub include_required: bool,
    pub include_defaults: bool,
    /// Context names, tags, or file paths (`./`, `/`, `~` prefixes).
    pub tags: Vec<String>,
}

/// One resolved context in composed order.
#[derive(Debug, Clone)]
pub struct ComposedContext {
    pub name: String,
    pub content: String,
    pub source_file: Option<PathBuf>,
    pub origin: Option<String>,
}

#[derive(Debug)]
pub struct ComposeOptions<'a> {
    /// Explicit role override; missing is fatal.
    pub role: Option<&'a str>,
    /// Task to compose; must already be present in the configuration.
    pub task: Option<&'a str>,
    /// Extra text for `{{.instructions}}` and the prompt tail.
    pub instructions: &'a str,
    pub workdir: &'a Path,
    pub cache_root: Option<PathBuf>,
}

/// Composition result.
#[derive(Debug)]
pub struct Composed {
    pub role_name: Option<String>,
    pub role_text: String,
    /// Temp file holding the resolved role, for `{{.role_file}}`.
    pub role_file: Option<PathBuf>,
    pub contexts: Vec<ComposedContext>,
    pub task_text: Option<String>,
    /// Contexts, task, and instructions concatenated in order.
    pub prompt: String,
}

/// Compose role text, ordered contexts, and the final prompt.
pub async fn compose(
    config: &Config,
    selection: &ContextSelection,
    opts: &ComposeOptions<'_>,
) -> Result<Composed> {
    let task = match opts.task {
        Some(name) => Some((
            name,
            config.tasks.get(name).ok_or_else(|| StartError::NotFound {
                kind: "task",
                name: name.to_string(),
            })?,
        )),
        None => None,
    };

    // Effective role: explicit override > task reference > settings default.
    // A task's dangling role reference is a warning, not fatal.
    let role_name = match opts.role {
        Some(name) => Some(name.to_string()),
        None => {
            let task_role = task.and_then(|(_, t)| t.role.as_deref());
            match task_role {
                Some(name) if config.roles.contains_key(name) => Some(name.to_string()),
                Some(name) => {
                    warn!(role = name, "task references unknown role; using default");
                    config.settings.default_role.clone()
                }
                None => config.settings.default_role.clone(),
            }
        }
    };

    let (role_text, role_file) = match &role_name {
        Some(name) => {
            let role = config.roles.get(name).ok_or_else(|| StartError::NotFound {
                kind: "role",
                name: name.clone(),
            })?;
            let resolved = resolve(
                &role.utd,
                &EvalContext {
                    kind: "role",
                    name,
                    workdir: opts.workdir,
                    instructions: opts.instructions,
                    origin: role.base.origin.as_deref(),
                    settings: &config.settings,
                    cache_root: opts.cache_root.clone(),
                },
            )
            .await?;
            (resolved.content, Some(resolved.file))
        }
        None => (String::new(), None),
    };

    let contexts = select_contexts(config, selection, opts).await?;

    let task_text = match task {
        Some((name, task)) => {
            let resolved = resolve(
                &task.utd,
                &EvalContext {
                    kind: "task",
                    name,
                    workdir: opts.workdir,
                    instructions: opts.instructions,
                    origin: task.base.origin.as_deref(),
                    settings: &config.settings,
                    cache_root: opts.cache_root.clone(),
                },
            )
            .await?;
            Some(resolved.content)
        }
        None => None,
    };

    let prompt = build_prompt(&contexts, task_text.as_deref(), opts.instructions);

    Ok(Composed {
        role_name,
        role_text,
        role_file,
        contexts,
        task_text,
        prompt,
    })
}

/// A name is a file path when it starts with `./`, `/`, or `~`.
fn is_path_input(name: &str) -> bool {
    name.starts_with("./") || name.starts_with('/') || name.starts_with('~')
}

/// Apply the selection predicate and ordering: required, then default, then
/// tagged (alphabetical within each bucket), then file-path entries in the
/// order the caller supplied them.
async fn select_contexts(
    config: &Config,
    selection: &ContextSelection,
    opts: &ComposeOptions<'_>,
) -> Result<Vec<ComposedContext>> {
    let mut chosen: Vec<&str> = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    // Required first. BTreeMap iteration keeps each bucket key-sorted.
    if selection.include_required {
        for (name, context) in &config.contexts {
            if context.required && seen.insert(name.as_str()) {
                chosen.push(name.as_str());
            }
        }
    }

    if selection.include_defaults {
        for (name, context) in &config.contexts {
            if context.default && seen.insert(name.as_str()) {
                chosen.push(name.as_str());
            }
        }
    }

    // Tagged additions never subtract from the buckets above.
    let mut tagged: BTreeSet<&str> = BTreeSet::new();
    let mut paths: Vec<&str> = Vec::new();
    for tag in &selection.tags {
        if is_path_input(tag) {
            paths.push(tag.as_str());
            continue;
        }
        let matches = matching_contexts(config, tag);
        if matches.is_empty() {
            warn!(context = %tag, "no context matches; skipping");
            continue;
        }
        tagged.extend(matches);
    }
    for name in tagged {
        if seen.insert(name) {
            chosen.push(name);
        }
    }

    let mut composed = Vec::with_capacity(chosen.len() + paths.len());
    for name in chosen {
        let context = &config.contexts[name];
        match resolve_context(config, name, context, opts).await {
            Ok(item) => composed.push(item),
            Err(e) if context.required => return Err(e),
            Err(e) => warn!(context = name, "skipping context: {e:#}"),
        }
    }

    for path in paths {
        match read_path_context(path, opts.workdir) {
            Ok(item) => composed.push(item),
            Err(e) => warn!(context = %path, "skipping file context: {e:#}"),
        }
    }

    Ok(composed)
}

/// Contexts whose key or tags match the selector, case-insensitively.
fn matching_contexts<'a>(config: &'a Config, selector: &str) -> Vec<&'a str> {
    let wanted = selector.to_lowercase();
    config
        .contexts
        .iter()
        .filter(|(name, context)| {
            name.to_lowercase() == wanted
                || context
                    .base
                    .tags
                    .iter()
                    .flatten()
                    .any(|tag| tag.to_lowercase() == wanted)
        })
        .map(|(name, _)| name.as_str())
        .collect()
}

async fn resolve_context(
    config: &Config,
    name: &str,
    context: &Context,
    opts: &ComposeOptions<'_>,
) -> Result<ComposedContext> {
    let resolved = resolve(
        &context.utd,
        &EvalContext {
            kind: "context",
            name,
            workdir: opts.workdir,
            instructions: opts.instructions,
            origin: context.base.origin.as_deref(),
            settings: &config.settings,
            cache_root: opts.cache_root.clone(),
        },
    )
    .await?;

    Ok(ComposedContext {
        name: name.to_string(),
        content: resolved.content,
        source_file: resolved.source_file,
        origin: context.base.origin.clone(),
    })
}

/// File-path selections bypass the lookup entirely and read straight from
/// disk.
fn read_path_context(raw: &str, workdir: &Path) -> Result<ComposedContext> {
    let path = if let Some(rest) = raw.strip_prefix("~/") {
        PathBuf::from(std::env::var("HOME").unwrap_or_default()).join(rest)
    } else {
        let p = PathBuf::from(raw);
        if p.is_absolute() { p } else { workdir.join(p) }
    };

    let content = std::fs::read_to_string(&path).map_err(|_| StartError::MissingFile {
        path: path.display().to_string(),
        entity: "context selection".to_string(),
    })?;

    Ok(ComposedContext {
        name: raw.to_string(),
        content,
        source_file: Some(path),
        origin: None,
    })
}

/// Concatenate contexts, task text, and instructions into the final prompt.
fn build_prompt(contexts: &[ComposedContext], task_text: Option<&str>, instructions: &str) -> String {
    let mut sections: Vec<String> = contexts
        .iter()
        .map(|c| format!("## Context: {}\n\n{}", c.name, c.content.trim_end()))
        .collect();

    match task_text {
        Some(task) => sections.push(task.trim_end().to_string()),
        None if !instructions.is_empty() => sections.push(instructions.to_string()),
        None => {}
    }

    sections.join("\n\n")
}

#[cfg(test)]
#[path = "composer_tests.rs"]
mod tests;
