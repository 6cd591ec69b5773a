use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::PathBuf;

mod assets_cmds;
mod cli;
mod compose_exec;
mod config_cmds;
mod doctor;
mod show_cmd;
mod task_cmd;

use cli::{Cli, Commands};
use start_config::loader::LoadedConfig;
use start_core::Config;
use start_registry::{registry_base, RegistryClient};

/// Everything a command handler needs: resolved directories and the merged
/// configuration snapshot.
pub(crate) struct AppContext {
    pub workdir: PathBuf,
    pub global_dir: Option<PathBuf>,
    pub local_dir: PathBuf,
    pub loaded: LoadedConfig,
    pub cache_root: Option<PathBuf>,
}

impl AppContext {
    fn load(directory: Option<&str>) -> Result<Self> {
        let (ctx, load_error) = Self::load_lenient(directory)?;
        match load_error {
            Some(e) => Err(e),
            None => Ok(ctx),
        }
    }

    /// Load, but keep going on configuration errors so doctor can diagnose
    /// them. The error, if any, is returned alongside an empty snapshot.
    fn load_lenient(directory: Option<&str>) -> Result<(Self, Option<anyhow::Error>)> {
        let workdir = match directory {
            Some(dir) => PathBuf::from(dir)
                .canonicalize()
                .with_context(|| format!("--directory {dir} does not exist"))?,
            None => std::env::current_dir().context("cannot determine working directory")?,
        };

        let global_dir = start_config::paths::global_config_dir();
        let local_dir = start_config::paths::local_config_dir(&workdir);
        let (loaded, load_error) =
            match start_config::load(global_dir.as_deref(), Some(local_dir.as_path())) {
                Ok(loaded) => (loaded, None),
                Err(e) => (
                    LoadedConfig {
                        raw: toml::Value::Table(toml::value::Table::new()),
                        config: Config::default(),
                        global_loaded: false,
                        local_loaded: false,
                    },
                    Some(e),
                ),
            };

        let ctx = Self {
            workdir,
            global_dir,
            local_dir,
            loaded,
            cache_root: start_config::paths::cache_root(),
        };
        Ok((ctx, load_error))
    }

    /// Re-read both scopes, e.g. after an install wrote a scope file.
    pub(crate) fn reload(&mut self) -> Result<()> {
        self.loaded =
            start_config::load(self.global_dir.as_deref(), Some(self.local_dir.as_path()))?;
        Ok(())
    }

    pub(crate) fn config(&self) -> &Config {
        &self.loaded.config
    }

    /// Scope directory that mutations target; `--local` picks the project.
    pub(crate) fn scope_dir(&self, local: bool) -> Result<PathBuf> {
        if local {
            Ok(self.local_dir.clone())
        } else {
            self.global_dir
                .clone()
                .context("no global config directory available; pass --local")
        }
    }

    pub(crate) fn registry_client(&self) -> RegistryClient {
        RegistryClient::new(registry_base(&self.config().settings))
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(!cli.no_color)
        .with_target(false)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    // Doctor diagnoses broken configuration, so it must survive a failed
    // load that is fatal for every other command.
    if matches!(cli.command, Some(Commands::Doctor)) {
        let (ctx, load_error) = AppContext::load_lenient(cli.directory.as_deref())?;
        let healthy = doctor::run(&ctx, load_error.as_ref());
        return Ok(if healthy { 0 } else { 1 });
    }

    let mut ctx = AppContext::load(cli.directory.as_deref())?;

    match &cli.command {
        None => compose_exec::run_start(&mut ctx, &cli).await?,
        Some(Commands::Prompt { text }) => {
            let text = text.clone();
            compose_exec::run_prompt(&mut ctx, &cli, &text).await?;
        }
        Some(Commands::Task { name, instructions }) => {
            let name = name.clone();
            let instructions = instructions.join(" ");
            task_cmd::run(&mut ctx, &cli, &name, &instructions).await?;
        }
        Some(Commands::Show { kind, name }) => {
            let kind = *kind;
            let name = name.clone();
            show_cmd::run(&mut ctx, &cli, kind, name.as_deref()).await?;
        }
        Some(Commands::Assets { cmd }) => assets_cmds::run(&mut ctx, &cli, cmd).await?,
        Some(Commands::Config { kind, verb }) => config_cmds::run(&mut ctx, &cli, *kind, verb)?,
        Some(Commands::Doctor) => unreachable!("doctor handled above"),
    }
    Ok(0)
}
