//! `start assets <verb>` and the shared resolve-or-install helper.

use anyhow::{bail, Context as _, Result};
use tracing::info;

use start_core::{AssetKind, Context, Role, StartError, Task, Utd};
use start_registry::{assets_add, assets_update, ResolvedAsset, Resolver, UpdateResult};

use crate::cli::{AssetsCommands, Cli};
use crate::AppContext;

const ALL_KINDS: [AssetKind; 4] = [
    AssetKind::Agent,
    AssetKind::Role,
    AssetKind::Context,
    AssetKind::Task,
];

pub(crate) async fn run(ctx: &mut AppContext, cli: &Cli, cmd: &AssetsCommands) -> Result<()> {
    match cmd {
        AssetsCommands::List => list(ctx),
        AssetsCommands::Add { name, kind } => add(ctx, cli, name, *kind).await,
        AssetsCommands::Info { name, kind } => info_cmd(ctx, name, *kind).await,
        AssetsCommands::Search { query } => search(ctx, query).await,
        AssetsCommands::Update => update(ctx, cli).await,
    }
}

/// Resolve a name through the tiers. A registry hit is installed into the
/// local scope and the configuration reloaded; a file path is materialised
/// as a synthetic entry in the in-memory snapshot.
pub(crate) async fn resolve_installing(
    ctx: &mut AppContext,
    kind: AssetKind,
    name: &str,
) -> Result<String> {
    let client = ctx.registry_client();
    let resolved = {
        let mut resolver = Resolver::new(ctx.config(), &client, ctx.cache_root.clone());
        resolver.resolve(kind, name).await?
    };

    match resolved {
        ResolvedAsset::Installed(key) => Ok(key),
        ResolvedAsset::Remote(entry) => {
            let cache_root = ctx
                .cache_root
                .clone()
                .context("no user cache directory available")?;
            let local_dir = ctx.local_dir.clone();
            let added = assets_add(&client, &entry.module, kind, &local_dir, &cache_root).await?;
            info!(kind = %kind, key = %added.key, version = %added.version, "installed on demand");
            ctx.reload()?;
            Ok(added.key)
        }
        ResolvedAsset::Path(path) => {
            let key = name.to_string();
            let utd = Utd {
                file: Some(path.display().to_string()),
                ..Default::default()
            };
            match kind {
                AssetKind::Role => {
                    ctx.loaded.config.roles.insert(
                        key.clone(),
                        Role {
                            utd,
                            ..Default::default()
                        },
                    );
                }
                AssetKind::Context => {
                    ctx.loaded.config.contexts.insert(
                        key.clone(),
                        Context {
                            utd,
                            ..Default::default()
                        },
                    );
                }
                AssetKind::Task => {
                    ctx.loaded.config.tasks.insert(
                        key.clone(),
                        Task {
                            utd,
                            ..Default::default()
                        },
                    );
                }
                AssetKind::Agent => bail!("an agent cannot be a file path"),
            }
            Ok(key)
        }
    }
}

fn list(ctx: &AppContext) -> Result<()> {
    let config = ctx.config();
    for kind in ALL_KINDS {
        let keys = config.keys_of(kind);
        if keys.is_empty() {
            continue;
        }
        println!("{}:", kind.collection_key());
        for key in keys {
            let base = config.base_of(kind, key);
            let description = base
                .and_then(|b| b.description.as_deref())
                .unwrap_or_default();
            match base.and_then(|b| b.origin.as_deref()) {
                Some(origin) => println!("  {key:<28} {description}  [registry: {origin}]"),
                None => println!("  {key:<28} {description}"),
            }
        }
    }
    Ok(())
}

async fn add(ctx: &mut AppContext, cli: &Cli, name: &str, kind_opt: Option<AssetKind>) -> Result<()> {
    let client = ctx.registry_client();

    let (kind, module) = if start_config::is_module_path(name) {
        let kind = kind_from_module(name)
            .or(kind_opt)
            .context("cannot infer the asset kind from the module path; pass --kind")?;
        (kind, name.to_string())
    } else {
        let mut resolver = Resolver::new(ctx.config(), &client, ctx.cache_root.clone());
        let index = resolver
            .index()
            .await?
            .context("no assets_index configured in settings")?
            .clone();

        let kinds: Vec<AssetKind> = kind_opt.map(|k| vec![k]).unwrap_or_else(|| ALL_KINDS.to_vec());
        let mut matches: Vec<(AssetKind, String, String)> = kinds
            .iter()
            .filter_map(|k| index.find(*k, name).map(|e| (*k, e.key(), e.module.clone())))
            .collect();

        if matches.is_empty() {
            for kind in &kinds {
                for candidate in resolver.substring_candidates(*kind, name) {
                    if let Some(entry) = candidate.remote {
                        matches.push((*kind, entry.key(), entry.module.clone()));
                    }
                }
            }
        }

        match matches.len() {
            0 => return Err(StartError::ModuleNotFound(name.to_string()).into()),
            1 => {
                let (kind, _, module) = matches.remove(0);
                (kind, module)
            }
            _ => {
                return Err(StartError::Ambiguous {
                    name: name.to_string(),
                    candidates: matches
                        .into_iter()
                        .map(|(kind, key, _)| format!("{key} ({kind})"))
                        .collect(),
                }
                .into());
            }
        }
    };

    let scope = ctx.scope_dir(cli.local)?;
    let cache_root = ctx
        .cache_root
        .clone()
        .context("no user cache directory available")?;
    let added = assets_add(&client, &module, kind, &scope, &cache_root).await?;
    ctx.reload()?;

    println!(
        "installed {} '{}' {} (origin {})",
        added.kind, added.key, added.version, added.origin
    );
    Ok(())
}

async fn info_cmd(ctx: &mut AppContext, name: &str, kind_opt: Option<AssetKind>) -> Result<()> {
    let client = ctx.registry_client();
    let mut resolver = Resolver::new(ctx.config(), &client, ctx.cache_root.clone());
    let kinds: Vec<AssetKind> = kind_opt.map(|k| vec![k]).unwrap_or_else(|| ALL_KINDS.to_vec());

    for kind in kinds {
        match resolver.resolve(kind, name).await {
            Ok(ResolvedAsset::Installed(key)) => {
                let entry = ctx
                    .loaded
                    .raw
                    .get(kind.collection_key())
                    .and_then(|c| c.get(&key))
                    .context("installed entry vanished from the raw snapshot")?;
                println!("{} '{}' (installed)", kind, key);
                print!("{}", toml::to_string_pretty(entry)?);
                return Ok(());
            }
            Ok(ResolvedAsset::Remote(entry)) => {
                println!("{} '{}' (registry)", kind, entry.key());
                println!("module: {}", entry.module);
                if let Some(description) = &entry.description {
                    println!("description: {description}");
                }
                if let Some(tags) = &entry.tags {
                    println!("tags: {}", tags.join(", "));
                }
                if let Some(bin) = &entry.bin {
                    println!("bin: {bin}");
                }
                return Ok(());
            }
            Ok(ResolvedAsset::Path(path)) => {
                println!("file path: {}", path.display());
                return Ok(());
            }
            Err(e) => match e.downcast_ref::<StartError>() {
                Some(StartError::NotFound { .. }) => continue,
                _ => return Err(e),
            },
        }
    }

    Err(StartError::NotFound {
        kind: "asset",
        name: name.to_string(),
    }
    .into())
}

async fn search(ctx: &mut AppContext, query: &str) -> Result<()> {
    let client = ctx.registry_client();
    let mut resolver = Resolver::new(ctx.config(), &client, ctx.cache_root.clone());
    // Pull the index up front so the substring pass sees remote entries;
    // a config without assets_index searches installed assets only.
    resolver.index().await?;

    let mut any = false;
    for kind in ALL_KINDS {
        let candidates = resolver.substring_candidates(kind, query);
        if candidates.is_empty() {
            continue;
        }
        any = true;
        println!("{}:", kind.collection_key());
        for candidate in candidates {
            let place = if candidate.remote.is_some() {
                "registry"
            } else {
                "installed"
            };
            match &candidate.description {
                Some(desc) => println!("  {:<28} {desc} ({place})", candidate.key),
                None => println!("  {:<28} ({place})", candidate.key),
            }
        }
    }

    if !any {
        println!("no assets match '{query}'");
    }
    Ok(())
}

async fn update(ctx: &mut AppContext, cli: &Cli) -> Result<()> {
    let client = ctx.registry_client();
    let scope = ctx.scope_dir(cli.local)?;
    let cache_root = ctx
        .cache_root
        .clone()
        .context("no user cache directory available")?;

    let outcomes = assets_update(&client, ctx.config(), &scope, &cache_root).await;
    if outcomes.is_empty() {
        println!("no registry-installed assets to update");
        return Ok(());
    }

    for outcome in &outcomes {
        match &outcome.result {
            UpdateResult::Updated { from, to } => match from {
                Some(from) => println!("{} {}: updated {from} -> {to}", outcome.kind, outcome.key),
                None => println!("{} {}: updated -> {to}", outcome.kind, outcome.key),
            },
            UpdateResult::Current { version } => {
                println!("{} {}: current ({version})", outcome.kind, outcome.key);
            }
            UpdateResult::Failed(message) => {
                println!("{} {}: failed: {message}", outcome.kind, outcome.key);
            }
        }
    }

    ctx.reload()?;
    Ok(())
}

/// Infer the asset kind from a module path's category segment
/// (`example.com/roles/...` installs a role).
fn kind_from_module(module: &str) -> Option<AssetKind> {
    let category = module.split('/').nth(1)?;
    match category {
        "agents" => Some(AssetKind::Agent),
        "roles" => Some(AssetKind::Role),
        "contexts" => Some(AssetKind::Context),
        "tasks" => Some(AssetKind::Task),
        _ => None,
    }
}
