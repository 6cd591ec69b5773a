//! The UTD resolution pipeline: source text in, rendered temp file out.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

use start_core::{Settings, StartError, Utd};

use crate::shell::{self, ShellSpec};
use crate::template::{references, Placeholders};

/// Everything the evaluator needs besides the UTD itself.
#[derive(Debug)]
pub struct EvalContext<'a> {
    /// Entity type label, used in the temp filename (`role-assistant.md`).
    pub kind: &'static str,
    /// Entity name (collection key).
    pub name: &'a str,
    pub workdir: &'a Path,
    /// Caller-supplied extra text for `{{.instructions}}`.
    pub instructions: &'a str,
    /// Module path of the asset's origin, for `@module/` file rewrites.
    pub origin: Option<&'a str>,
    pub settings: &'a Settings,
    /// Module cache root; only needed when `@module/` files are in play.
    pub cache_root: Option<PathBuf>,
}

/// Result of resolving one UTD.
#[derive(Debug)]
pub struct ResolvedUtd {
    /// Final rendered content.
    pub content: String,
    /// Temp file the content was written to; this is what `{{.file}}`
    /// substitutes to, never the original source path.
    pub file: PathBuf,
    /// Captured stdout, when a command ran.
    pub command_output: Option<String>,
    /// The source file that was read, when the UTD had one.
    pub source_file: Option<PathBuf>,
}

/// Resolve a UTD into text and write it under `<workdir>/.start/temp/`.
///
/// Shell failures (missing shell, non-zero exit, timeout) are downgraded to
/// warnings with partial or empty `command_output`; missing source files and
/// template errors are returned to the caller to classify.
pub async fn resolve(utd: &Utd, ctx: &EvalContext<'_>) -> Result<ResolvedUtd> {
    if utd.is_empty() {
        return Err(StartError::EmptySource {
            kind: ctx.kind,
            name: ctx.name.to_string(),
        }
        .into());
    }

    let temp_file = temp_path(ctx);

    // The template body: inline prompt, else the file's content, else the
    // bare command output.
    let source_file = match &utd.file {
        Some(raw) => Some(source_path(raw, ctx)?),
        None => None,
    };

    let mut file_contents = String::new();
    let body = match (&utd.prompt, &source_file) {
        (Some(prompt), _) => {
            // Only read the file when the body actually asks for it.
            if let Some(path) = &source_file {
                if references(prompt, "file_contents") {
                    file_contents = read_source(path, ctx)?;
                }
            }
            prompt.clone()
        }
        (None, Some(path)) => {
            file_contents = read_source(path, ctx)?;
            file_contents.clone()
        }
        (None, None) => "{{.command_output}}".to_string(),
    };

    let command_output = match &utd.command {
        Some(command) if references(&body, "command_output") => {
            Some(run_command(utd, command, ctx).await)
        }
        _ => None,
    };

    let dict = Placeholders::new()
        .set("file", temp_file.display().to_string())
        .set("file_contents", file_contents)
        .set("command", utd.command.clone().unwrap_or_default())
        .set(
            "command_output",
            command_output.clone().unwrap_or_default(),
        )
        .set("date", chrono::Local::now().to_rfc3339())
        .set("instructions", ctx.instructions.to_string());

    let content = dict.render(&body)?;

    if let Some(parent) = temp_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&temp_file, &content)?;

    Ok(ResolvedUtd {
        content,
        file: temp_file,
        command_output,
        source_file,
    })
}

/// `<workdir>/.start/temp/<kind>-<sanitised-name>.md`. Overwritten on every
/// resolution, never rotated.
fn temp_path(ctx: &EvalContext<'_>) -> PathBuf {
    let name: String = ctx
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    start_config::paths::temp_dir(ctx.workdir).join(format!("{}-{}.md", ctx.kind, name))
}

/// Rewrite `@module/`, expand `~`, and anchor relative paths at the workdir.
fn source_path(raw: &str, ctx: &EvalContext<'_>) -> Result<PathBuf> {
    if let Some(rest) = raw.strip_prefix("@module/") {
        let origin = ctx.origin.ok_or_else(|| StartError::MissingFile {
            path: raw.to_string(),
            entity: format!("{} '{}' (no origin module)", ctx.kind, ctx.name),
        })?;
        let root = ctx
            .cache_root
            .as_deref()
            .and_then(|cache| start_config::paths::find_extracted(cache, origin))
            .ok_or_else(|| StartError::MissingFile {
                path: raw.to_string(),
                entity: format!("{} '{}' (module '{origin}' not cached)", ctx.kind, ctx.name),
            })?;
        return Ok(root.join(rest));
    }

    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Ok(PathBuf::from(home).join(rest));
        }
    }

    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(ctx.workdir.join(path))
    }
}

fn read_source(path: &Path, ctx: &EvalContext<'_>) -> Result<String> {
    std::fs::read_to_string(path).map_err(|_| {
        StartError::MissingFile {
            path: path.display().to_string(),
            entity: format!("{} '{}'", ctx.kind, ctx.name),
        }
        .into()
    })
}

/// Execute the UTD's command, downgrading every shell failure to a warning
/// with whatever output was captured.
async fn run_command(utd: &Utd, command: &str, ctx: &EvalContext<'_>) -> String {
    let shell = match ShellSpec::resolve(utd, ctx.settings) {
        Ok(shell) => shell,
        Err(e) => {
            warn!(
                entity = %format!("{} '{}'", ctx.kind, ctx.name),
                "skipping command: {e:#}"
            );
            return String::new();
        }
    };

    let timeout = shell::resolve_timeout(utd, ctx.settings);
    match shell::run(&shell, command, ctx.workdir, timeout).await {
        Ok(output) => {
            if output.timed_out {
                warn!(
                    entity = %format!("{} '{}'", ctx.kind, ctx.name),
                    "command timed out; using partial output"
                );
            } else if output.exit_code != 0 {
                warn!(
                    entity = %format!("{} '{}'", ctx.kind, ctx.name),
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "command failed; using captured output"
                );
            }
            output.stdout
        }
        Err(e) => {
            warn!(
                entity = %format!("{} '{}'", ctx.kind, ctx.name),
                "skipping command: {e:#}"
            );
            String::new()
        }
    }
}

#[cfg(test)]
#[path = "utd_tests.rs"]
mod tests;
