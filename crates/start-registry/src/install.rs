//! Installing and updating registry assets into a configuration scope.

use anyhow::{Context as _, Result};
use std::path::Path;
use tracing::{info, warn};

use start_core::{AssetKind, Config, StartError};

use crate::client::{split_module, RegistryClient};
use crate::index::asset_key;

/// Outcome of `assets add`.
#[derive(Debug, Clone)]
pub struct AddedAsset {
    pub kind: AssetKind,
    /// Collection key the asset was written under.
    pub key: String,
    /// Module path without version, as stamped into `origin`.
    pub origin: String,
    /// Canonical fetched version, e.g. `v0.3.2`.
    pub version: String,
}

/// Per-asset `assets update` report line.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub kind: AssetKind,
    pub key: String,
    pub result: UpdateResult,
}

#[derive(Debug, Clone)]
pub enum UpdateResult {
    Updated { from: Option<String>, to: String },
    Current { version: String },
    Failed(String),
}

/// Fetch `module` (a `host/path@vN` index entry) and install its asset record
/// into the scope directory. The written file is validated by the store;
/// failures roll back.
pub async fn assets_add(
    client: &RegistryClient,
    module: &str,
    kind: AssetKind,
    scope_dir: &Path,
    cache_root: &Path,
) -> Result<AddedAsset> {
    let (base_module, _) = split_module(module)?;
    let version = client.resolve_latest(module).await?;
    let dir = client.fetch_module(base_module, &version, cache_root).await?;

    let mut record = read_asset_record(&dir, kind)?;
    // Stamp the origin so listings can tell registry assets from
    // user-defined ones, and so `@module/` files resolve.
    record.insert(
        "origin".to_string(),
        toml::Value::String(base_module.to_string()),
    );

    let key = asset_key(base_module);
    start_config::store::write_asset(
        scope_dir,
        kind.collection_key(),
        &key,
        toml::Value::Table(record),
    )?;

    info!(kind = %kind, key, version, "installed asset");
    Ok(AddedAsset {
        kind,
        key,
        origin: base_module.to_string(),
        version,
    })
}

/// Re-resolve and refetch every installed asset that has an origin, in key
/// order, regenerating its entry. Never aborts on a single failure; the
/// caller renders the per-asset report.
pub async fn assets_update(
    client: &RegistryClient,
    config: &Config,
    scope_dir: &Path,
    cache_root: &Path,
) -> Vec<UpdateOutcome> {
    let mut outcomes = Vec::new();

    for kind in [
        AssetKind::Agent,
        AssetKind::Role,
        AssetKind::Context,
        AssetKind::Task,
    ] {
        for key in config.keys_of(kind) {
            let Some(origin) = config
                .base_of(kind, key)
                .and_then(|b| b.origin.clone())
            else {
                continue;
            };

            let result = update_one(client, kind, &origin, scope_dir, cache_root).await;
            outcomes.push(UpdateOutcome {
                kind,
                key: key.to_string(),
                result: match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(kind = %kind, key, "update failed: {e:#}");
                        UpdateResult::Failed(format!("{e:#}"))
                    }
                },
            });
        }
    }

    outcomes
}

async fn update_one(
    client: &RegistryClient,
    kind: AssetKind,
    origin: &str,
    scope_dir: &Path,
    cache_root: &Path,
) -> Result<UpdateResult> {
    // Origins are stored without version; track the major-zero pseudo line.
    let module = format!("{origin}@v0");
    let previous = start_config::paths::find_extracted(cache_root, origin)
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().to_string()))
        .and_then(|name| name.rsplit_once('@').map(|(_, v)| v.to_string()));

    let latest = client.resolve_latest(&module).await?;
    if previous.as_deref() == Some(latest.as_str()) {
        return Ok(UpdateResult::Current { version: latest });
    }

    let added = assets_add(client, &module, kind, scope_dir, cache_root).await?;
    Ok(UpdateResult::Updated {
        from: previous,
        to: added.version,
    })
}

/// An asset module carries exactly one record file named after its category
/// (`role.toml` with a single `[role]` table, and so on).
fn read_asset_record(dir: &Path, kind: AssetKind) -> Result<toml::value::Table> {
    let path = dir.join(format!("{}.toml", kind.as_str()));
    let content = std::fs::read_to_string(&path).map_err(|_| StartError::Validation {
        entity: dir.display().to_string(),
        reason: format!("module does not contain {}.toml", kind.as_str()),
    })?;

    let value: toml::Value = content
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;

    value
        .get(kind.as_str())
        .and_then(toml::Value::as_table)
        .cloned()
        .ok_or_else(|| {
            StartError::Validation {
                entity: path.display().to_string(),
                reason: format!("expected a single top-level [{}] record", kind.as_str()),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_asset_record_extracts_single_table() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("role.toml"),
            "[role]\nprompt = \"You review Go code.\"\ntags = [\"golang\"]\n",
        )
        .unwrap();

        let record = read_asset_record(tmp.path(), AssetKind::Role).unwrap();
        assert_eq!(record["prompt"].as_str().unwrap(), "You review Go code.");
    }

    #[test]
    fn read_asset_record_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_asset_record(tmp.path(), AssetKind::Task).unwrap_err();
        assert!(format!("{err:#}").contains("task.toml"));
    }

    #[test]
    fn read_asset_record_wrong_top_key() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("agent.toml"), "[role]\nprompt = \"x\"\n").unwrap();
        assert!(read_asset_record(tmp.path(), AssetKind::Agent).is_err());
    }

    /// Full install flow against a pre-populated cache: the fetch is a cache
    /// hit, so no network is involved.
    #[tokio::test]
    async fn add_stamps_origin_without_version() {
        let cache = TempDir::new().unwrap();
        let scope = TempDir::new().unwrap();

        let base = "example.com/roles/golang/code-review";
        let extracted =
            start_config::paths::module_extract_dir(cache.path(), base, "v0.2.0");
        std::fs::create_dir_all(&extracted).unwrap();
        std::fs::write(
            extracted.join("role.toml"),
            "[role]\nprompt = \"Review Go code.\"\n",
        )
        .unwrap();

        // resolve_latest would hit the network, so drive the cache-hit path
        // via a version list served from... nothing: instead call the pieces
        // that matter. fetch_module() is a cache hit; emulate resolve_latest.
        let client = RegistryClient::new("http://registry.invalid");
        let dir = client
            .fetch_module(base, "v0.2.0", cache.path())
            .await
            .unwrap();
        assert_eq!(dir, extracted);

        let mut record = read_asset_record(&dir, AssetKind::Role).unwrap();
        record.insert("origin".into(), toml::Value::String(base.into()));
        start_config::store::write_asset(
            scope.path(),
            AssetKind::Role.collection_key(),
            &asset_key(base),
            toml::Value::Table(record),
        )
        .unwrap();

        let items =
            start_config::store::read_scope_file(scope.path(), AssetKind::Role.collection_key())
                .unwrap();
        let entry = items["golang/code-review"].as_table().unwrap();
        assert_eq!(
            entry["origin"].as_str().unwrap(),
            "example.com/roles/golang/code-review"
        );
        assert!(!entry["origin"].as_str().unwrap().contains("@v"));
    }
}
