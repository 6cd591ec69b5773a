//! Static configuration diagnostics behind `start doctor`.

use std::path::Path;

use start_core::{AssetKind, Utd};
use start_template::ShellSpec;

use crate::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pass,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn symbol(self) -> &'static str {
        match self {
            Self::Pass => "✓",
            Self::Warn => "!",
            Self::Fail => "✗",
            Self::Info => "·",
        }
    }
}

#[derive(Debug)]
struct CheckResult {
    status: Status,
    name: String,
    detail: String,
}

#[derive(Debug)]
struct Section {
    title: &'static str,
    results: Vec<CheckResult>,
}

impl Section {
    fn new(title: &'static str) -> Self {
        Self {
            title,
            results: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, name: impl Into<String>, detail: impl Into<String>) {
        self.results.push(CheckResult {
            status,
            name: name.into(),
            detail: detail.into(),
        });
    }
}

/// Run every check, print the report tree, and return overall health.
/// Healthy means no failure and no warning.
pub(crate) fn run(ctx: &AppContext, load_error: Option<&anyhow::Error>) -> bool {
    let sections = vec![
        check_build(),
        check_scopes(ctx, load_error),
        check_agents(ctx),
        check_sources(ctx),
        check_references(ctx),
        check_settings(ctx),
        check_schema(ctx),
        check_environment(ctx),
    ];

    let mut healthy = true;
    for section in &sections {
        println!("{}", section.title);
        for result in &section.results {
            println!("  {} {}: {}", result.status.symbol(), result.name, result.detail);
            if matches!(result.status, Status::Fail | Status::Warn) {
                healthy = false;
            }
        }
        println!();
    }

    if healthy {
        println!("all checks passed");
    } else {
        println!("problems found; see above");
    }
    healthy
}

fn check_build() -> Section {
    let mut section = Section::new("start");
    let git = env!("START_GIT_DESCRIBE");
    let version = if git.is_empty() {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        format!("{} ({git})", env!("CARGO_PKG_VERSION"))
    };
    section.push(Status::Info, "version", version);
    section.push(
        Status::Info,
        "platform",
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
    );
    section
}

fn check_scopes(ctx: &AppContext, load_error: Option<&anyhow::Error>) -> Section {
    let mut section = Section::new("configuration");

    if let Some(e) = load_error {
        section.push(Status::Fail, "merged load", format!("{e:#}"));
    }

    let scopes: [(&str, Option<&Path>); 2] = [
        ("global", ctx.global_dir.as_deref()),
        ("local", Some(ctx.local_dir.as_path())),
    ];

    for (label, dir) in scopes {
        let Some(dir) = dir else {
            section.push(Status::Warn, label, "no directory available");
            continue;
        };
        if !dir.is_dir() {
            section.push(Status::Info, label, format!("{} (not present)", dir.display()));
            continue;
        }

        // Compile each file standalone so a unit failure still names the
        // files that parse on their own.
        let diags = start_config::diagnose_dir(dir);
        if diags.is_empty() {
            section.push(
                Status::Info,
                label,
                format!("{} (no configuration files)", dir.display()),
            );
            continue;
        }

        let bad: Vec<String> = diags
            .iter()
            .filter_map(|d| d.outcome.as_ref().err().map(|e| e.clone()))
            .collect();
        let files: Vec<String> = diags
            .iter()
            .filter_map(|d| d.path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();

        if bad.is_empty() {
            section.push(
                Status::Pass,
                label,
                format!("{} [{}]", dir.display(), files.join(", ")),
            );
        } else {
            section.push(Status::Fail, label, bad.join("; "));
        }
    }

    section
}

fn check_agents(ctx: &AppContext) -> Section {
    let mut section = Section::new("agents");
    let config = ctx.config();

    if config.agents.is_empty() {
        section.push(
            Status::Warn,
            "agents",
            "none configured; run 'start assets add' or 'start config agent add'",
        );
        return section;
    }

    for (name, agent) in &config.agents {
        let bin = agent.bin_or(name);
        match which::which(bin) {
            Ok(path) => section.push(Status::Pass, name.as_str(), path.display().to_string()),
            Err(_) => section.push(
                Status::Fail,
                name.as_str(),
                format!("'{bin}' not in PATH: install it or fix the agent's bin"),
            ),
        }
    }
    section
}

/// Per-UTD checks: a content source exists, and plain file sources resolve.
fn check_sources(ctx: &AppContext) -> Section {
    let mut section = Section::new("sources");
    let config = ctx.config();

    let mut check = |kind: AssetKind, name: &str, utd: &Utd| {
        let entity = format!("{}.{name}", kind.collection_key());
        if utd.is_empty() {
            section.push(
                Status::Fail,
                entity,
                "no content source: set one of file, command, or prompt",
            );
            return;
        }
        if let Some(file) = &utd.file {
            if file.starts_with("@module/") {
                // Resolved against the module cache at composition time.
                section.push(Status::Info, entity, format!("module file {file}"));
                return;
            }
            let path = if Path::new(file).is_absolute() {
                Path::new(file).to_path_buf()
            } else if let Some(rest) = file.strip_prefix("~/") {
                Path::new(&std::env::var("HOME").unwrap_or_default()).join(rest)
            } else {
                ctx.workdir.join(file)
            };
            if path.is_file() {
                section.push(Status::Pass, entity, file.clone());
            } else {
                section.push(Status::Warn, entity, format!("file not found: {file}"));
            }
        } else {
            section.push(Status::Pass, entity, "ok");
        }
    };

    for (name, role) in &config.roles {
        check(AssetKind::Role, name, &role.utd);
    }
    for (name, context) in &config.contexts {
        check(AssetKind::Context, name, &context.utd);
    }
    for (name, task) in &config.tasks {
        check(AssetKind::Task, name, &task.utd);
    }
    section
}

fn check_references(ctx: &AppContext) -> Section {
    let mut section = Section::new("references");
    let config = ctx.config();

    for (name, task) in &config.tasks {
        if let Some(role) = &task.role {
            if config.roles.contains_key(role) {
                section.push(Status::Pass, format!("tasks.{name}.role"), role.clone());
            } else {
                section.push(
                    Status::Warn,
                    format!("tasks.{name}.role"),
                    format!("role '{role}' is not configured"),
                );
            }
        }
        if let Some(agent) = &task.agent {
            if config.agents.contains_key(agent) {
                section.push(Status::Pass, format!("tasks.{name}.agent"), agent.clone());
            } else {
                section.push(
                    Status::Warn,
                    format!("tasks.{name}.agent"),
                    format!("agent '{agent}' is not configured"),
                );
            }
        }
    }

    if section.results.is_empty() {
        section.push(Status::Info, "references", "none to check");
    }
    section
}

fn check_settings(ctx: &AppContext) -> Section {
    let mut section = Section::new("settings");
    let settings = &ctx.config().settings;

    match &settings.default_agent {
        Some(agent) if ctx.config().agents.contains_key(agent) => {
            section.push(Status::Pass, "default_agent", agent.clone());
        }
        Some(agent) => section.push(
            Status::Fail,
            "default_agent",
            format!("'{agent}' is not a configured agent: remove it or install the agent"),
        ),
        None => section.push(Status::Info, "default_agent", "not set"),
    }

    match &settings.default_role {
        Some(role) if ctx.config().roles.contains_key(role) => {
            section.push(Status::Pass, "default_role", role.clone());
        }
        Some(role) => section.push(
            Status::Fail,
            "default_role",
            format!("'{role}' is not a configured role: remove it or install the role"),
        ),
        None => section.push(Status::Info, "default_role", "not set"),
    }

    match ShellSpec::resolve(&Utd::default(), settings) {
        Ok(spec) => match which::which(&spec.program) {
            Ok(path) => section.push(Status::Pass, "shell", path.display().to_string()),
            Err(_) => section.push(
                Status::Fail,
                "shell",
                format!("'{}' not in PATH: check settings.shell", spec.program),
            ),
        },
        Err(e) => section.push(Status::Fail, "shell", format!("{e:#}")),
    }

    match &settings.assets_index {
        Some(index) if start_config::is_module_path(index) => {
            section.push(Status::Pass, "assets_index", index.clone());
        }
        Some(index) => section.push(
            Status::Fail,
            "assets_index",
            format!("'{index}' is not a module path"),
        ),
        None => section.push(Status::Info, "assets_index", "not set"),
    }

    section
}

/// Schema-level validation: the typed projection already tolerated unknown
/// fields, so everything flagged here is a genuine constraint violation.
fn check_schema(ctx: &AppContext) -> Section {
    let mut section = Section::new("schema");
    let issues = start_config::validate_config(ctx.config());

    if issues.is_empty() {
        section.push(Status::Pass, "constraints", "all entries satisfy the schema");
    } else {
        for issue in issues {
            section.push(Status::Fail, issue.entity, issue.problem);
        }
    }
    section
}

fn check_environment(ctx: &AppContext) -> Section {
    let mut section = Section::new("environment");

    let temp = start_config::paths::temp_dir(&ctx.workdir);
    section.push_writable("temp dir", &temp);

    match &ctx.cache_root {
        Some(cache) => section.push_writable("module cache", cache),
        None => section.push(Status::Warn, "module cache", "no cache directory available"),
    }
    section
}

impl Section {
    /// Probe a directory for writeability by creating it and touching a file.
    fn push_writable(&mut self, name: &'static str, dir: &Path) {
        let probe = dir.join(".doctor-probe");
        let outcome = std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(&probe, b"probe"))
            .and_then(|_| std::fs::remove_file(&probe));
        match outcome {
            Ok(()) => self.push(Status::Pass, name, dir.display().to_string()),
            Err(e) => self.push(
                Status::Fail,
                name,
                format!("{} not writable: {e}", dir.display()),
            ),
        }
    }
}
