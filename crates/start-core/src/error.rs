/// Classified failures. Each variant's display names the kind, the entity,
/// and where it helps, a single suggested fix.
#[derive(thiserror::Error, Debug)]
pub enum StartError {
    #[error("syntax error in {path}:{line}:{column}: {message}\n{snippet}")]
    ConfigSyntax {
        path: String,
        line: usize,
        column: usize,
        message: String,
        snippet: String,
    },

    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    #[error("invalid {entity}: {reason}")]
    Validation { entity: String, reason: String },

    #[error("{kind} '{name}' not found: check your config or run 'start assets search {name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("'{name}' is ambiguous; candidates: {}", candidates.join(", "))]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },

    #[error("registry request failed after {attempts} attempts: {message}")]
    Registry { attempts: u32, message: String },

    #[error("module '{0}' not found in the registry index")]
    ModuleNotFound(String),

    #[error("no usable shell: install bash or sh, or set settings.shell")]
    ShellNotFound,

    #[error("unknown placeholder '{{{{.{0}}}}}' in template")]
    UnknownPlaceholder(String),

    #[error("file not found: {path} (referenced by {entity}): check the path")]
    MissingFile { path: String, entity: String },

    #[error("{kind} '{name}' has no content source: set one of file, command, or prompt")]
    EmptySource { kind: &'static str, name: String },
}
