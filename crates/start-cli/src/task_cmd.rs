//! `start task <name> [instructions...]`

use anyhow::Result;

use start_compose::ContextSelection;
use start_core::AssetKind;

use crate::cli::Cli;
use crate::AppContext;

pub(crate) async fn run(
    ctx: &mut AppContext,
    cli: &Cli,
    name: &str,
    instructions: &str,
) -> Result<()> {
    // Tier lookup; a registry task is installed first and the configuration
    // reloaded, so composition always sees a fresh snapshot.
    let task_key = crate::assets_cmds::resolve_installing(ctx, AssetKind::Task, name).await?;

    let selection = ContextSelection {
        include_required: true,
        include_defaults: true,
        tags: cli.context.clone(),
    };
    crate::compose_exec::compose_and_execute(ctx, cli, selection, Some(&task_key), instructions)
        .await
}
