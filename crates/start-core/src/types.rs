use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::keys;

/// Hard floor and ceiling for UTD/settings timeouts, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 3600;
/// Applied when neither the UTD nor settings specify a timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Asset category, used for CLI arguments, resolution, and scope files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Agent,
    Role,
    Context,
    Task,
}

impl AssetKind {
    /// Singular name, as used in CLI arguments and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Role => "role",
            Self::Context => "context",
            Self::Task => "task",
        }
    }

    /// The top-level collection key (and scope filename stem) for this kind.
    pub fn collection_key(&self) -> &'static str {
        match self {
            Self::Agent => keys::AGENTS,
            Self::Role => keys::ROLES,
            Self::Context => keys::CONTEXTS,
            Self::Task => keys::TASKS,
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata shared by every asset. The asset's name is the collection key,
/// never a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Base {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lowercase-kebab-case labels used for context selection and search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Module path this asset was installed from; absent for user-defined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Unified Template Directive: how to derive text from a file, a command,
/// or an inline template. At least one of `file`, `command`, `prompt` must
/// be present; this is enforced at resolution time, not parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utd {
    /// Source text file. `@module/...` refers into the extracted cache of
    /// the asset's origin module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Shell command whose stdout becomes `command_output`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Inline template body with `{{.placeholder}}` substitution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Shell invocation prefix, e.g. `bash -c` or `python3 -c`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Command timeout in seconds (1..=3600).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Utd {
    /// True when no content source is set at all.
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.command.is_none() && self.prompt.is_none()
    }
}

/// An external AI CLI tool. Agents execute commands, they do not generate
/// text, so there is no embedded UTD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub base: Base,
    /// Command template; substituted with the executor dictionary.
    pub command: String,
    /// Binary name, used for `{{.bin}}` and PATH detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Preferred-alias table: requested model strings that are keys are
    /// substituted, everything else passes through verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, String>,
}

impl Agent {
    /// The binary to look up on PATH: explicit `bin`, else the asset key.
    pub fn bin_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.bin.as_deref().unwrap_or(name)
    }

    /// Map a requested model through the alias table; absent request falls
    /// back to `default_model`, which is mapped the same way.
    pub fn resolve_model(&self, requested: Option<&str>) -> Option<String> {
        let model = requested
            .map(str::to_string)
            .or_else(|| self.default_model.clone())?;
        Some(self.models.get(&model).cloned().unwrap_or(model))
    }
}

/// The system prompt for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(flatten)]
    pub base: Base,
    #[serde(flatten)]
    pub utd: Utd,
}

/// A document or command output included in the composed prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(flatten)]
    pub base: Base,
    #[serde(flatten)]
    pub utd: Utd,
    /// Always included; a missing source file is fatal.
    #[serde(default)]
    pub required: bool,
    /// Included when the selection asks for defaults.
    #[serde(default)]
    pub default: bool,
}

/// A reusable prompt with optional role/agent bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub base: Base,
    #[serde(flatten)]
    pub utd: Utd,
    /// Name reference to a configured role; unresolved is a warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Name reference to a configured agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Flat settings record. Fields merge individually across scopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_role: Option<String>,
    /// Shell invocation prefix used when a UTD does not override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Default command timeout in seconds (1..=3600).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Module path of the registry asset index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets_index: Option<String>,
    /// Registry base URL override. `START_REGISTRY` wins over this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

/// Merged typed configuration. Collections are ordered maps so iteration is
/// deterministic by key; the outer key is the asset name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agents: BTreeMap<String, Agent>,
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    /// Project the typed model out of a merged raw value. Unknown fields are
    /// tolerated (open-schema semantics); only shape errors fail.
    pub fn from_value(value: toml::Value) -> Result<Self, toml::de::Error> {
        value.try_into()
    }

    /// Sorted keys of one collection.
    pub fn keys_of(&self, kind: AssetKind) -> Vec<&str> {
        match kind {
            AssetKind::Agent => self.agents.keys().map(String::as_str).collect(),
            AssetKind::Role => self.roles.keys().map(String::as_str).collect(),
            AssetKind::Context => self.contexts.keys().map(String::as_str).collect(),
            AssetKind::Task => self.tasks.keys().map(String::as_str).collect(),
        }
    }

    /// Base metadata for a named asset of a given kind, if present.
    pub fn base_of(&self, kind: AssetKind, name: &str) -> Option<&Base> {
        match kind {
            AssetKind::Agent => self.agents.get(name).map(|a| &a.base),
            AssetKind::Role => self.roles.get(name).map(|r| &r.base),
            AssetKind::Context => self.contexts.get(name).map(|c| &c.base),
            AssetKind::Task => self.tasks.get(name).map(|t| &t.base),
        }
    }
}
