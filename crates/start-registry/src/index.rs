use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use start_core::AssetKind;

/// One registry entry: a module path with enough metadata to search on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// `host/path@vN`, validated by [`start_config::is_module_path`].
    pub module: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Binary name, for agent entries.
    #[serde(default)]
    pub bin: Option<String>,
}

impl IndexEntry {
    /// Module path without the `@vN` suffix, the value stamped into
    /// `origin` on install.
    pub fn base_module(&self) -> &str {
        self.module
            .rsplit_once('@')
            .map(|(base, _)| base)
            .unwrap_or(&self.module)
    }

    /// The `vN` major pseudo-version.
    pub fn major(&self) -> &str {
        self.module
            .rsplit_once('@')
            .map(|(_, v)| v)
            .unwrap_or("v0")
    }

    /// The asset key the entry installs under: the module path minus the
    /// host and category segments. `example.com/roles/golang/code-review@v0`
    /// installs as `golang/code-review`.
    pub fn key(&self) -> String {
        asset_key(self.base_module())
    }
}

/// Derive an asset key from a versionless module path.
pub fn asset_key(base_module: &str) -> String {
    let mut parts = base_module.splitn(3, '/');
    let _host = parts.next();
    let _category = parts.next();
    match parts.next() {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        // Degenerate single-segment modules keep their last component.
        _ => base_module
            .rsplit('/')
            .next()
            .unwrap_or(base_module)
            .to_string(),
    }
}

/// The registry index: entries grouped by category. Lives in `index.toml` at
/// the root of the index module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub agents: Vec<IndexEntry>,
    #[serde(default)]
    pub roles: Vec<IndexEntry>,
    #[serde(default)]
    pub contexts: Vec<IndexEntry>,
    #[serde(default)]
    pub tasks: Vec<IndexEntry>,
}

impl AssetIndex {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse registry index")
    }

    pub fn entries(&self, kind: AssetKind) -> &[IndexEntry] {
        match kind {
            AssetKind::Agent => &self.agents,
            AssetKind::Role => &self.roles,
            AssetKind::Context => &self.contexts,
            AssetKind::Task => &self.tasks,
        }
    }

    /// Exact key lookup within one category.
    pub fn find(&self, kind: AssetKind, key: &str) -> Option<&IndexEntry> {
        self.entries(kind).iter().find(|e| e.key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_accessors() {
        let entry = IndexEntry {
            module: "example.com/roles/golang/code-review@v1".into(),
            description: Some("Go review role".into()),
            tags: None,
            bin: None,
        };
        assert_eq!(entry.base_module(), "example.com/roles/golang/code-review");
        assert_eq!(entry.major(), "v1");
        assert_eq!(entry.key(), "golang/code-review");
    }

    #[test]
    fn asset_key_drops_host_and_category() {
        assert_eq!(asset_key("example.com/agents/claude"), "claude");
        assert_eq!(
            asset_key("example.com/tasks/golang/code-review"),
            "golang/code-review"
        );
    }

    #[test]
    fn parses_grouped_index() {
        let raw = r#"
            [[agents]]
            module = "example.com/agents/claude@v0"
            description = "Anthropic CLI"
            bin = "claude"

            [[roles]]
            module = "example.com/roles/assistant@v0"
            tags = ["general"]

            [[roles]]
            module = "example.com/roles/golang/code-review@v0"
        "#;
        let index = AssetIndex::parse(raw).unwrap();
        assert_eq!(index.agents.len(), 1);
        assert_eq!(index.roles.len(), 2);
        assert!(index.contexts.is_empty());

        assert!(index
            .find(start_core::AssetKind::Role, "golang/code-review")
            .is_some());
        assert!(index.find(start_core::AssetKind::Role, "claude").is_none());
    }
}
