use regex::Regex;
use std::sync::OnceLock;

use start_core::{Config, Utd, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};

/// Module paths look like `example.com/roles/golang/code-review@v0`.
fn module_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9.-]+/[a-z0-9/_-]+@v[0-9]+$").unwrap())
}

fn kebab_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap())
}

pub fn is_module_path(s: &str) -> bool {
    module_path_re().is_match(s)
}

pub fn is_kebab_tag(s: &str) -> bool {
    kebab_tag_re().is_match(s)
}

/// One constraint violation, attributed to an entity like `agents.claude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub entity: String,
    pub problem: String,
}

impl Issue {
    fn new(entity: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            problem: problem.into(),
        }
    }
}

/// Run every constraint check over the typed configuration. Unknown fields
/// were already tolerated during deserialisation (open-schema semantics), so
/// everything reported here is a genuine violation.
pub fn validate_config(config: &Config) -> Vec<Issue> {
    let mut issues = Vec::new();

    for (name, agent) in &config.agents {
        let entity = format!("agents.{name}");
        if agent.command.trim().is_empty() {
            issues.push(Issue::new(&entity, "command must be a non-empty template"));
        }
        check_tags(&entity, agent.base.tags.as_deref(), &mut issues);
        check_origin(&entity, agent.base.origin.as_deref(), &mut issues);
    }

    for (name, role) in &config.roles {
        let entity = format!("roles.{name}");
        check_utd(&entity, &role.utd, &mut issues);
        check_tags(&entity, role.base.tags.as_deref(), &mut issues);
        check_origin(&entity, role.base.origin.as_deref(), &mut issues);
    }

    for (name, context) in &config.contexts {
        let entity = format!("contexts.{name}");
        check_utd(&entity, &context.utd, &mut issues);
        check_tags(&entity, context.base.tags.as_deref(), &mut issues);
        check_origin(&entity, context.base.origin.as_deref(), &mut issues);
    }

    for (name, task) in &config.tasks {
        let entity = format!("tasks.{name}");
        check_utd(&entity, &task.utd, &mut issues);
        check_tags(&entity, task.base.tags.as_deref(), &mut issues);
        check_origin(&entity, task.base.origin.as_deref(), &mut issues);
    }

    if let Some(timeout) = config.settings.timeout {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
            issues.push(Issue::new(
                "settings",
                format!("timeout {timeout} outside {MIN_TIMEOUT_SECS}..={MAX_TIMEOUT_SECS}"),
            ));
        }
    }
    if let Some(shell) = &config.settings.shell {
        if shell.trim().is_empty() {
            issues.push(Issue::new("settings", "shell must be non-empty when set"));
        }
    }
    if let Some(index) = &config.settings.assets_index {
        if !is_module_path(index) {
            issues.push(Issue::new(
                "settings",
                format!("assets_index '{index}' is not a module path"),
            ));
        }
    }

    issues
}

fn check_utd(entity: &str, utd: &Utd, issues: &mut Vec<Issue>) {
    if utd.is_empty() {
        issues.push(Issue::new(
            entity,
            "no content source: set one of file, command, or prompt",
        ));
    }
    if let Some(timeout) = utd.timeout {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
            issues.push(Issue::new(
                entity,
                format!("timeout {timeout} outside {MIN_TIMEOUT_SECS}..={MAX_TIMEOUT_SECS}"),
            ));
        }
    }
    if let Some(shell) = &utd.shell {
        if shell.trim().is_empty() {
            issues.push(Issue::new(entity, "shell must be non-empty when set"));
        }
    }
}

fn check_tags(entity: &str, tags: Option<&[String]>, issues: &mut Vec<Issue>) {
    for tag in tags.unwrap_or_default() {
        if !is_kebab_tag(tag) {
            issues.push(Issue::new(
                entity,
                format!("tag '{tag}' is not lowercase-kebab-case"),
            ));
        }
    }
}

fn check_origin(entity: &str, origin: Option<&str>, issues: &mut Vec<Issue>) {
    if let Some(origin) = origin {
        // Stored without version, so validate against the path part only.
        if !is_module_path(&format!("{origin}@v0")) {
            issues.push(Issue::new(
                entity,
                format!("origin '{origin}' is not a module path"),
            ));
        }
    }
}
