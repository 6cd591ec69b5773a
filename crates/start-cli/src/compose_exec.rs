//! Shared compose-then-execute flow behind `start`, `prompt`, and `task`.

use anyhow::{bail, Result};
use tracing::info;

use start_compose::{compose, ComposeOptions, ContextSelection};
use start_core::{StartError, Utd};
use start_exec::{build_command, exec_agent, write_dry_run_artifacts, ExecRequest};
use start_template::ShellSpec;

use crate::cli::Cli;
use crate::AppContext;

/// Default invocation: required + default contexts, default agent.
pub(crate) async fn run_start(ctx: &mut AppContext, cli: &Cli) -> Result<()> {
    let selection = ContextSelection {
        include_required: true,
        include_defaults: true,
        tags: cli.context.clone(),
    };
    compose_and_execute(ctx, cli, selection, None, "").await
}

/// One-off focused prompt: required contexts only.
pub(crate) async fn run_prompt(ctx: &mut AppContext, cli: &Cli, text: &str) -> Result<()> {
    let selection = ContextSelection {
        include_required: true,
        include_defaults: false,
        tags: cli.context.clone(),
    };
    compose_and_execute(ctx, cli, selection, None, text).await
}

/// Compose role + contexts (+ task), build the agent command, then either
/// print it (dry-run) or replace this process with the agent.
pub(crate) async fn compose_and_execute(
    ctx: &mut AppContext,
    cli: &Cli,
    selection: ContextSelection,
    task: Option<&str>,
    instructions: &str,
) -> Result<()> {
    // Agent choice: flag > task binding > settings default. Resolving the
    // flag may install from the registry, so it happens before composition.
    let agent_name = match &cli.agent {
        Some(name) => crate::assets_cmds::resolve_installing(
            ctx,
            start_core::AssetKind::Agent,
            name,
        )
        .await?,
        None => {
            let config = ctx.config();
            let from_task = task
                .and_then(|t| config.tasks.get(t))
                .and_then(|t| t.agent.clone());
            match from_task.or_else(|| config.settings.default_agent.clone()) {
                Some(name) => name,
                None => bail!(
                    "no agent selected: pass --agent or set settings.default_agent"
                ),
            }
        }
    };

    let config = ctx.config();
    let agent = config
        .agents
        .get(&agent_name)
        .ok_or_else(|| StartError::NotFound {
            kind: "agent",
            name: agent_name.clone(),
        })?;

    let opts = ComposeOptions {
        role: cli.role.as_deref(),
        task,
        instructions,
        workdir: &ctx.workdir,
        cache_root: ctx.cache_root.clone(),
    };
    let composed = compose(config, &selection, &opts).await?;

    let command = build_command(&ExecRequest {
        agent_name: &agent_name,
        agent,
        role_text: &composed.role_text,
        role_file: composed.role_file.as_deref(),
        prompt: &composed.prompt,
        model: cli.model.as_deref(),
    })?;

    if cli.dry_run {
        let artifacts =
            write_dry_run_artifacts(&composed.role_text, &composed.prompt, &command)?;
        println!("{command}");
        eprintln!("dry-run artefacts: {}", artifacts.dir.display());
        return Ok(());
    }

    info!(agent = %agent_name, "handing off");
    let shell = ShellSpec::resolve(&Utd::default(), &config.settings)?;
    exec_agent(&shell, &command, &ctx.workdir)
}
