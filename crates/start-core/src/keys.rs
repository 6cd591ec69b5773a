//! Centralised top-level configuration key names.
//!
//! Every module that touches raw configuration values goes through these
//! constants so a typo cannot silently split a collection in two.

pub const AGENTS: &str = "agents";
pub const ROLES: &str = "roles";
pub const CONTEXTS: &str = "contexts";
pub const TASKS: &str = "tasks";
pub const SETTINGS: &str = "settings";

/// Collection keys merge with item-level replacement semantics.
pub const COLLECTIONS: &[&str] = &[AGENTS, ROLES, CONTEXTS, TASKS];

/// All known top-level keys, one per scope file.
pub const ALL: &[&str] = &[AGENTS, ROLES, CONTEXTS, TASKS, SETTINGS];

/// Filename (without extension) for a top-level key. They are identical;
/// the function exists to make call sites read as intent.
pub fn file_stem(key: &str) -> &str {
    key
}
