//! `start show <kind> [name]`: resolve content and preview it.

use anyhow::{bail, Context as _, Result};

use start_core::{AssetKind, StartError};
use start_template::{resolve, EvalContext};

use crate::cli::Cli;
use crate::AppContext;

const PREVIEW_LINES: usize = 5;

pub(crate) async fn run(
    ctx: &mut AppContext,
    _cli: &Cli,
    kind: AssetKind,
    name: Option<&str>,
) -> Result<()> {
    let name = match (name, kind) {
        (Some(name), _) => name.to_string(),
        (None, AssetKind::Agent) => ctx
            .config()
            .settings
            .default_agent
            .clone()
            .context("no agent named and no settings.default_agent")?,
        (None, AssetKind::Role) => ctx
            .config()
            .settings
            .default_role
            .clone()
            .context("no role named and no settings.default_role")?,
        (None, _) => bail!("show {kind} needs a name"),
    };

    if kind == AssetKind::Agent {
        return show_agent(ctx, &name);
    }

    let key = crate::assets_cmds::resolve_installing(ctx, kind, &name).await?;
    let config = ctx.config();
    let (utd, origin) = match kind {
        AssetKind::Role => {
            let role = config.roles.get(&key).ok_or_else(|| not_found(kind, &key))?;
            (&role.utd, role.base.origin.as_deref())
        }
        AssetKind::Context => {
            let context = config
                .contexts
                .get(&key)
                .ok_or_else(|| not_found(kind, &key))?;
            (&context.utd, context.base.origin.as_deref())
        }
        AssetKind::Task => {
            let task = config.tasks.get(&key).ok_or_else(|| not_found(kind, &key))?;
            (&task.utd, task.base.origin.as_deref())
        }
        AssetKind::Agent => unreachable!("agents handled above"),
    };

    let resolved = resolve(
        utd,
        &EvalContext {
            kind: kind.as_str(),
            name: &key,
            workdir: &ctx.workdir,
            instructions: "",
            origin,
            settings: &config.settings,
            cache_root: ctx.cache_root.clone(),
        },
    )
    .await?;

    println!("{}", resolved.file.display());
    preview(&resolved.content);
    Ok(())
}

fn show_agent(ctx: &AppContext, name: &str) -> Result<()> {
    let config = ctx.config();
    let agent = config
        .agents
        .get(name)
        .ok_or_else(|| not_found(AssetKind::Agent, name))?;

    println!("agent '{name}'");
    println!("command: {}", agent.command);
    println!("bin: {}", agent.bin_or(name));
    if let Some(model) = &agent.default_model {
        println!("default_model: {model}");
    }
    if !agent.models.is_empty() {
        let aliases: Vec<String> = agent
            .models
            .iter()
            .map(|(alias, id)| format!("{alias}={id}"))
            .collect();
        println!("models: {}", aliases.join(", "));
    }
    Ok(())
}

fn not_found(kind: AssetKind, name: &str) -> anyhow::Error {
    StartError::NotFound {
        kind: kind.as_str(),
        name: name.to_string(),
    }
    .into()
}

fn preview(content: &str) {
    for line in content.lines().take(PREVIEW_LINES) {
        println!("  {line}");
    }
    let total = content.lines().count();
    if total > PREVIEW_LINES {
        println!("  ... ({} more lines)", total - PREVIEW_LINES);
    }
}
