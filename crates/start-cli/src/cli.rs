use clap::{Parser, Subcommand, ValueEnum};
use start_core::AssetKind;

/// Build version string combining Cargo.toml version and git describe.
fn build_version() -> &'static str {
    static VERSION: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION.get_or_init(|| {
        let cargo_ver = env!("CARGO_PKG_VERSION");
        let git_desc = env!("START_GIT_DESCRIBE");
        if git_desc.is_empty() {
            cargo_ver.to_string()
        } else {
            format!("{cargo_ver} ({git_desc})")
        }
    })
}

#[derive(Parser)]
#[command(name = "start", version = build_version())]
#[command(about = "Compose a role, contexts, and a prompt, then launch an AI agent")]
pub struct Cli {
    /// With no subcommand: compose the default agent with required and
    /// default contexts, then execute.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Agent to launch (overrides task and settings defaults)
    #[arg(long, global = true)]
    pub agent: Option<String>,

    /// Role to compose (overrides task and settings defaults)
    #[arg(long, global = true)]
    pub role: Option<String>,

    /// Model name or agent-defined alias
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Extra contexts by name, tag, or file path (comma or repeat)
    #[arg(long, global = true, value_delimiter = ',')]
    pub context: Vec<String>,

    /// Working directory (defaults to CWD)
    #[arg(long, global = true)]
    pub directory: Option<String>,

    /// Target the project-local scope (./.start) for config mutations
    #[arg(long, global = true)]
    pub local: bool,

    /// Print the command and artefact files instead of executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// More logging (info level)
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Full debug logging
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub debug: bool,

    /// Errors only
    #[arg(long, global = true, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Disable ANSI colour in log output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// One-off focused prompt with minimal context
    Prompt {
        /// The prompt text
        text: String,
    },

    /// Resolve a task, compose, and execute
    Task {
        /// Task name (installed, registry, or file path)
        name: String,

        /// Extra instructions appended to the task
        #[arg(trailing_var_arg = true)]
        instructions: Vec<String>,
    },

    /// Resolve an asset's content, write it to the temp dir, preview 5 lines
    Show {
        /// Asset kind
        kind: AssetKind,

        /// Asset name; defaults to the configured default where one exists
        name: Option<String>,
    },

    /// Manage registry assets
    Assets {
        #[command(subcommand)]
        cmd: AssetsCommands,
    },

    /// Inspect and mutate configuration files
    Config {
        /// Configuration type
        kind: ConfigKind,

        #[command(subcommand)]
        verb: ConfigVerb,
    },

    /// Diagnose configuration health
    Doctor,
}

#[derive(Subcommand)]
pub enum AssetsCommands {
    /// List installed assets, marking registry-sourced ones
    List,

    /// Resolve a name and install the asset into a scope
    Add {
        /// Asset name or module path
        name: String,

        /// Restrict resolution to one kind
        #[arg(long)]
        kind: Option<AssetKind>,
    },

    /// Show details for one asset
    Info {
        name: String,

        #[arg(long)]
        kind: Option<AssetKind>,
    },

    /// Search installed assets and the registry index
    Search {
        query: String,
    },

    /// Refetch every installed asset that has an origin
    Update,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigKind {
    Agent,
    Role,
    Context,
    Task,
    Settings,
}

impl ConfigKind {
    pub fn asset_kind(self) -> Option<AssetKind> {
        match self {
            Self::Agent => Some(AssetKind::Agent),
            Self::Role => Some(AssetKind::Role),
            Self::Context => Some(AssetKind::Context),
            Self::Task => Some(AssetKind::Task),
            Self::Settings => None,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigVerb {
    /// List entries (or settings fields)
    List,

    /// Append a minimal entry to the scope file
    Add { name: String },

    /// Print one entry as TOML
    Info { name: Option<String> },

    /// Open the scope file in $EDITOR
    Edit,

    /// Remove an entry from the scope file
    Remove { name: String },

    /// Set the settings default (agents and roles only)
    Default { name: String },
}
