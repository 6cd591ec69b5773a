//! `start config <type> <verb>`: scope-file mutations.

use anyhow::{bail, Context as _, Result};
use tracing::warn;

use start_core::{keys, AssetKind, StartError};

use crate::cli::{Cli, ConfigKind, ConfigVerb};
use crate::AppContext;

pub(crate) fn run(
    ctx: &mut AppContext,
    cli: &Cli,
    kind: ConfigKind,
    verb: &ConfigVerb,
) -> Result<()> {
    match verb {
        ConfigVerb::List => list(ctx, kind),
        ConfigVerb::Info { name } => info(ctx, kind, name.as_deref()),
        ConfigVerb::Edit => edit(ctx, cli, kind),
        ConfigVerb::Add { name } => add(ctx, cli, kind, name),
        ConfigVerb::Remove { name } => remove(ctx, cli, kind, name),
        ConfigVerb::Default { name } => set_default(ctx, cli, kind, name),
    }
}

fn collection_key(kind: ConfigKind) -> &'static str {
    match kind.asset_kind() {
        Some(kind) => kind.collection_key(),
        None => keys::SETTINGS,
    }
}

fn list(ctx: &AppContext, kind: ConfigKind) -> Result<()> {
    let config = ctx.config();
    match kind.asset_kind() {
        Some(kind) => {
            for key in config.keys_of(kind) {
                let description = config
                    .base_of(kind, key)
                    .and_then(|b| b.description.as_deref())
                    .unwrap_or_default();
                println!("{key:<28} {description}");
            }
        }
        None => {
            print!("{}", toml::to_string_pretty(&config.settings)?);
        }
    }
    Ok(())
}

fn info(ctx: &AppContext, kind: ConfigKind, name: Option<&str>) -> Result<()> {
    match kind.asset_kind() {
        Some(asset_kind) => {
            let name = name.context("config info needs a name for this type")?;
            let entry = ctx
                .loaded
                .raw
                .get(asset_kind.collection_key())
                .and_then(|c| c.get(name))
                .ok_or_else(|| StartError::NotFound {
                    kind: asset_kind.as_str(),
                    name: name.to_string(),
                })?;
            print!("{}", toml::to_string_pretty(entry)?);
        }
        None => {
            print!("{}", toml::to_string_pretty(&ctx.config().settings)?);
        }
    }
    Ok(())
}

fn edit(ctx: &AppContext, cli: &Cli, kind: ConfigKind) -> Result<()> {
    let scope = ctx.scope_dir(cli.local)?;
    let path = start_config::store::scope_file_path(&scope, collection_key(kind));
    if !path.exists() {
        bail!(
            "{} does not exist yet; create an entry first with 'start config ... add'",
            path.display()
        );
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = std::process::Command::new(editor).arg(&path).status()?;
    if !status.success() {
        warn!("editor exited with non-zero status");
    }
    Ok(())
}

/// Append a minimal entry so the user has something to edit.
fn add(ctx: &mut AppContext, cli: &Cli, kind: ConfigKind, name: &str) -> Result<()> {
    let Some(asset_kind) = kind.asset_kind() else {
        bail!("settings has a fixed record; use 'start config settings edit'");
    };

    let scope = ctx.scope_dir(cli.local)?;
    let template = match asset_kind {
        AssetKind::Agent => format!("command = \"{{{{.bin}}}} -p {{{{.prompt}}}}\"\nbin = \"{name}\"\n"),
        AssetKind::Role | AssetKind::Task => "prompt = \"\"\n".to_string(),
        AssetKind::Context => "prompt = \"\"\ndefault = false\nrequired = false\n".to_string(),
    };
    let value: toml::Value = template.parse()?;

    let path =
        start_config::store::write_asset(&scope, asset_kind.collection_key(), name, value)?;
    ctx.reload()?;
    println!("added {} '{}' to {}", asset_kind, name, path.display());
    Ok(())
}

fn remove(ctx: &mut AppContext, cli: &Cli, kind: ConfigKind, name: &str) -> Result<()> {
    let Some(asset_kind) = kind.asset_kind() else {
        bail!("settings fields cannot be removed; edit the file instead");
    };

    let scope = ctx.scope_dir(cli.local)?;
    if !start_config::store::remove_asset(&scope, asset_kind.collection_key(), name)? {
        return Err(StartError::NotFound {
            kind: asset_kind.as_str(),
            name: name.to_string(),
        }
        .into());
    }
    ctx.reload()?;
    println!("removed {} '{}'", asset_kind, name);
    Ok(())
}

fn set_default(ctx: &mut AppContext, cli: &Cli, kind: ConfigKind, name: &str) -> Result<()> {
    let field = match kind {
        ConfigKind::Agent => "default_agent",
        ConfigKind::Role => "default_role",
        _ => bail!("only agents and roles have a settings default"),
    };

    // The default must reference something that exists in the merged view.
    let exists = match kind {
        ConfigKind::Agent => ctx.config().agents.contains_key(name),
        ConfigKind::Role => ctx.config().roles.contains_key(name),
        _ => unreachable!(),
    };
    if !exists {
        return Err(StartError::NotFound {
            kind: if kind == ConfigKind::Agent { "agent" } else { "role" },
            name: name.to_string(),
        }
        .into());
    }

    let scope = ctx.scope_dir(cli.local)?;
    start_config::store::write_settings_field(
        &scope,
        field,
        toml::Value::String(name.to_string()),
    )?;
    ctx.reload()?;
    println!("settings.{field} = \"{name}\"");
    Ok(())
}
