//! Three-tier asset name resolution: installed, index, substring search.

use anyhow::Result;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use tracing::debug;

use start_core::{AssetKind, Config, StartError};

use crate::client::RegistryClient;
use crate::index::{AssetIndex, IndexEntry};

/// Matches scoring below this are dropped from the substring tier.
pub const MIN_MATCH_SCORE: u32 = 25;

const SCORE_NAME_PREFIX: u32 = 100;
const SCORE_NAME_SUBSTRING: u32 = 75;
const SCORE_TAG: u32 = 50;
const SCORE_DESCRIPTION: u32 = 25;

/// Where a resolved name points.
#[derive(Debug, Clone)]
pub enum ResolvedAsset {
    /// Present in the merged configuration under this key.
    Installed(String),
    /// Known to the registry index only; fetch to use.
    Remote(IndexEntry),
    /// A file path given verbatim; the tiers were skipped.
    Path(PathBuf),
}

/// A substring-tier match.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: String,
    pub score: u32,
    /// Set when the candidate came from the index rather than the config.
    pub remote: Option<IndexEntry>,
    pub description: Option<String>,
}

/// Stateful resolver: fetches the index at most once per invocation.
pub struct Resolver<'a> {
    config: &'a Config,
    client: &'a RegistryClient,
    cache_root: Option<PathBuf>,
    index: Option<AssetIndex>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        config: &'a Config,
        client: &'a RegistryClient,
        cache_root: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            client,
            cache_root,
            index: None,
        }
    }

    /// Resolve a command-line name through the tiers, first win.
    ///
    /// Interactivity is detected from stdin and stderr; disambiguation is the
    /// only step that ever prompts.
    pub async fn resolve(&mut self, kind: AssetKind, query: &str) -> Result<ResolvedAsset> {
        if is_path_input(query) {
            return Ok(ResolvedAsset::Path(PathBuf::from(query)));
        }

        // Tier 1: exact key in the merged installed configuration.
        if self.config.keys_of(kind).iter().any(|k| *k == query) {
            debug!(kind = %kind, name = query, "resolved installed");
            return Ok(ResolvedAsset::Installed(query.to_string()));
        }

        // Tier 2: exact key in the fetched index.
        if let Some(index) = self.index().await? {
            if let Some(entry) = index.find(kind, query) {
                debug!(kind = %kind, name = query, module = %entry.module, "resolved from index");
                return Ok(ResolvedAsset::Remote(entry.clone()));
            }
        }

        // Tier 3: case-insensitive substring across installed + index.
        let candidates = self.substring_candidates(kind, query);
        match candidates.len() {
            0 => Err(StartError::NotFound {
                kind: kind.as_str(),
                name: query.to_string(),
            }
            .into()),
            1 => Ok(candidate_to_resolved(candidates.into_iter().next().unwrap())),
            _ if interactive() => {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                let mut err = std::io::stderr();
                let picked = choose(query, &candidates, &mut input, &mut err)?;
                Ok(candidate_to_resolved(candidates[picked].clone()))
            }
            _ => Err(StartError::Ambiguous {
                name: query.to_string(),
                candidates: candidates.into_iter().map(|c| c.key).collect(),
            }
            .into()),
        }
    }

    /// Lazy index fetch: once per invocation, `None` when no index module is
    /// configured. Network failures after retries are fatal.
    pub async fn index(&mut self) -> Result<Option<&AssetIndex>> {
        if self.index.is_none() {
            let Some(module) = self.config.settings.assets_index.as_deref() else {
                return Ok(None);
            };
            let Some(cache_root) = self.cache_root.clone() else {
                return Ok(None);
            };
            let index = self.client.fetch_index(module, &cache_root).await?;
            self.index = Some(index);
        }
        Ok(self.index.as_ref())
    }

    /// Score every installed and indexed asset of this kind against the
    /// query, best first, ties broken by key.
    pub fn substring_candidates(&self, kind: AssetKind, query: &str) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();

        for key in self.config.keys_of(kind) {
            let base = self.config.base_of(kind, key);
            let score = score_match(
                query,
                key,
                base.and_then(|b| b.tags.as_deref()).unwrap_or_default(),
                base.and_then(|b| b.description.as_deref()),
            );
            if score >= MIN_MATCH_SCORE {
                candidates.push(Candidate {
                    key: key.to_string(),
                    score,
                    remote: None,
                    description: base.and_then(|b| b.description.clone()),
                });
            }
        }

        if let Some(index) = &self.index {
            for entry in index.entries(kind) {
                let key = entry.key();
                // Installed assets shadow their index entry.
                if candidates.iter().any(|c| c.key == key) {
                    continue;
                }
                let score = score_match(
                    query,
                    &key,
                    entry.tags.as_deref().unwrap_or_default(),
                    entry.description.as_deref(),
                );
                if score >= MIN_MATCH_SCORE {
                    candidates.push(Candidate {
                        key,
                        score,
                        remote: Some(entry.clone()),
                        description: entry.description.clone(),
                    });
                }
            }
        }

        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        candidates
    }
}

fn candidate_to_resolved(candidate: Candidate) -> ResolvedAsset {
    match candidate.remote {
        Some(entry) => ResolvedAsset::Remote(entry),
        None => ResolvedAsset::Installed(candidate.key),
    }
}

/// File-path inputs skip the tiers entirely.
pub fn is_path_input(name: &str) -> bool {
    name.starts_with("./") || name.starts_with('/') || name.starts_with('~')
}

fn interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

/// Relevance score for one asset: name-prefix beats name-substring beats tag
/// beats description, all case-insensitive.
pub fn score_match(query: &str, key: &str, tags: &[String], description: Option<&str>) -> u32 {
    let query = query.to_lowercase();
    let key_lower = key.to_lowercase();

    if key_lower.starts_with(&query)
        || key_lower
            .rsplit('/')
            .next()
            .is_some_and(|leaf| leaf.starts_with(&query))
    {
        return SCORE_NAME_PREFIX;
    }
    if key_lower.contains(&query) {
        return SCORE_NAME_SUBSTRING;
    }
    // Near-miss rule for misspelled tails: a shared prefix covering at least
    // two thirds of the query (and 3+ chars) counts as a name match, so
    // `assistent` still finds `assistant`.
    let leaf = key_lower.rsplit('/').next().unwrap_or(&key_lower);
    let lcp = common_prefix_len(&query, leaf);
    if lcp >= 3 && lcp * 3 >= query.len() * 2 {
        return SCORE_NAME_SUBSTRING;
    }
    if tags.iter().any(|t| t.to_lowercase().contains(&query)) {
        return SCORE_TAG;
    }
    if description.is_some_and(|d| d.to_lowercase().contains(&query)) {
        return SCORE_DESCRIPTION;
    }
    0
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Numbered-menu disambiguation. The user answers with the candidate number
/// or its full key; anything else is rejected.
pub fn choose<R: BufRead, W: Write>(
    query: &str,
    candidates: &[Candidate],
    input: &mut R,
    out: &mut W,
) -> Result<usize> {
    writeln!(out, "'{query}' matches several assets:")?;
    for (i, candidate) in candidates.iter().enumerate() {
        match &candidate.description {
            Some(desc) => writeln!(out, "  {}. {}  {desc}", i + 1, candidate.key)?,
            None => writeln!(out, "  {}. {}", i + 1, candidate.key)?,
        }
    }
    write!(out, "Select (number or full name): ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();

    if let Ok(n) = answer.parse::<usize>() {
        if (1..=candidates.len()).contains(&n) {
            return Ok(n - 1);
        }
        return Err(StartError::Validation {
            entity: query.to_string(),
            reason: format!("selection {n} is out of range 1..={}", candidates.len()),
        }
        .into());
    }

    if let Some(i) = candidates.iter().position(|c| c.key == answer) {
        return Ok(i);
    }

    Err(StartError::Validation {
        entity: query.to_string(),
        reason: format!("'{answer}' is neither a number nor a listed name"),
    }
    .into())
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
