mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "actions",
    about = "Run one-off, ordered data actions exactly once per database",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .actions/ or .git/)
    #[arg(long, global = true, env = "ACTIONS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Connection to use as the default for this invocation
    #[arg(long, global = true, env = "ACTIONS_CONNECTION")]
    connection: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .actions/config.yaml, the actions directory, and the ledger table
    Init,

    /// Apply every pending action as one batch
    #[command(visible_alias = "migrate")]
    Run {
        /// List what would run without applying anything
        #[arg(long)]
        pretend: bool,
    },

    /// Revert the most recent batch(es)
    Rollback {
        /// Number of batches to revert
        #[arg(long, default_value = "1")]
        step: u32,
    },

    /// Revert every applied action
    Reset,

    /// Revert every applied action, then run everything again
    Refresh,

    /// Show applied, pending, and missing actions
    Status,

    /// Scaffold a new action file
    Make {
        /// Action name, e.g. SeedDefaultRoles or "seed default roles"
        name: String,
    },

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { pretend: false }
        | Commands::Rollback { .. }
        | Commands::Reset
        | Commands::Refresh => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let connection = cli.connection.as_deref();

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Run { pretend } => cmd::run::run(&root, connection, pretend, cli.json),
        Commands::Rollback { step } => cmd::run::rollback(&root, connection, step, cli.json),
        Commands::Reset => cmd::run::reset(&root, connection, cli.json),
        Commands::Refresh => cmd::run::refresh(&root, connection, cli.json),
        Commands::Status => cmd::status::run(&root, connection, cli.json),
        Commands::Make { name } => cmd::make::run(&root, &name, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
