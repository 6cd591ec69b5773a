//! Module registry client: version listing and archive fetch with bounded
//! retry.

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use start_core::{Settings, StartError};

use crate::cache::extract_tarball;
use crate::index::AssetIndex;

/// Built-in registry, used when neither `START_REGISTRY` nor
/// `settings.registry` says otherwise.
pub const DEFAULT_REGISTRY: &str = "https://registry.start.dev";

const FETCH_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Resolve the registry base URL: environment, then settings, then default.
pub fn registry_base(settings: &Settings) -> String {
    std::env::var("START_REGISTRY")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| settings.registry.clone())
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Shared registry handle. The underlying HTTP client is lazily initialised
/// once and reused for every request in the invocation.
#[derive(Debug)]
pub struct RegistryClient {
    base: String,
    http: OnceLock<reqwest::Client>,
}

impl RegistryClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            http: OnceLock::new(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn http(&self) -> &reqwest::Client {
        self.http.get_or_init(reqwest::Client::new)
    }

    /// GET with exponential backoff. 404 is terminal (the module or version
    /// does not exist); transport errors and 5xx responses retry.
    async fn get_bytes(&self, url: &str, missing: &str) -> Result<Vec<u8>> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=FETCH_ATTEMPTS {
            match self.http().get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(StartError::ModuleNotFound(missing.to_string()).into());
                    }
                    if status.is_success() {
                        return Ok(response
                            .bytes()
                            .await
                            .context("failed to read registry response body")?
                            .to_vec());
                    }
                    last_error = format!("{url}: status {status}");
                }
                Err(e) => last_error = format!("{url}: {e}"),
            }

            if attempt < FETCH_ATTEMPTS {
                debug!(url, attempt, "registry request failed; retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(StartError::Registry {
            attempts: FETCH_ATTEMPTS,
            message: last_error,
        }
        .into())
    }

    /// `GET {base}/{module}/@v/list`: one version tag per line.
    pub async fn list_versions(&self, base_module: &str) -> Result<Vec<semver::Version>> {
        let url = format!("{}/{}/@v/list", self.base, base_module);
        let body = self.get_bytes(&url, base_module).await?;
        let text = String::from_utf8_lossy(&body);

        let mut versions = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match semver::Version::parse(line.trim_start_matches('v')) {
                Ok(v) => versions.push(v),
                Err(_) => warn!(module = base_module, tag = line, "ignoring bad version tag"),
            }
        }
        Ok(versions)
    }

    /// Convert `name@vN` to its canonical latest concrete version (`vN.x.y`).
    pub async fn resolve_latest(&self, module: &str) -> Result<String> {
        let (base, major) = split_module(module)?;
        let versions = self.list_versions(base).await?;
        let latest = pick_latest(&versions, major)
            .ok_or_else(|| StartError::ModuleNotFound(module.to_string()))?;
        Ok(format!("v{latest}"))
    }

    /// Fetch one canonical `module@vX.Y.Z` into the extract cache, returning
    /// the extracted directory. Cache entries are content-addressed by
    /// canonical version: a hit skips the network entirely.
    pub async fn fetch_module(
        &self,
        base_module: &str,
        version: &str,
        cache_root: &Path,
    ) -> Result<PathBuf> {
        let dest = start_config::paths::module_extract_dir(cache_root, base_module, version);
        if dest.is_dir() {
            debug!(module = base_module, version, "module cache hit");
            return Ok(dest);
        }

        let url = format!("{}/{}/@v/{}.tar.gz", self.base, base_module, version);
        let coordinates = format!("{base_module}@{version}");
        let bytes = self.get_bytes(&url, &coordinates).await?;
        extract_tarball(&bytes, &dest)?;
        Ok(dest)
    }

    /// Resolve and fetch the index module, then parse `index.toml` from its
    /// extracted tree.
    pub async fn fetch_index(&self, index_module: &str, cache_root: &Path) -> Result<AssetIndex> {
        let (base, _) = split_module(index_module)?;
        let version = self.resolve_latest(index_module).await?;
        let dir = self.fetch_module(base, &version, cache_root).await?;

        let path = dir.join("index.toml");
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("index module has no index.toml at {}", path.display()))?;
        AssetIndex::parse(&content)
    }
}

/// Split `name@vN` into the versionless path and the major number.
pub fn split_module(module: &str) -> Result<(&str, u64)> {
    let (base, tag) = module.rsplit_once('@').ok_or_else(|| StartError::Validation {
        entity: module.to_string(),
        reason: "module path is missing its @vN major version".into(),
    })?;
    let major = tag
        .strip_prefix('v')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| StartError::Validation {
            entity: module.to_string(),
            reason: format!("'{tag}' is not a major pseudo-version like v0"),
        })?;
    Ok((base, major))
}

/// Highest released version within a major line; prereleases are skipped.
pub fn pick_latest(versions: &[semver::Version], major: u64) -> Option<semver::Version> {
    versions
        .iter()
        .filter(|v| v.major == major && v.pre.is_empty())
        .max()
        .cloned()
}
