//! `sk`: keep and restore kitty workspace sessions per project.
//!
//! Typical wiring:
//!
//! ```text
//! sk pick --root ~/code | fzf | xargs sk open      # open or create a session
//! sk watch < events.ndjson                         # keep sessions fresh
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sessionkeep_core::config::Config;
use sessionkeep_core::error::format_error_with_remediation;
use sessionkeep_core::logging::{LogFormat, init_logging};

#[derive(Parser)]
#[command(name = "sk")]
#[command(version, about = "Keep and restore kitty workspace sessions per project", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/sessionkeep/sessionkeep.toml)
    #[arg(long, global = true, env = "SK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format override (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a project: replay its stored session, or start a new one
    Open {
        /// Project directory (a picker answer; blank means nothing chosen)
        dir: String,
        /// Window that asked for the session; closed once the session is up
        #[arg(long, env = "KITTY_WINDOW_ID")]
        origin: Option<u64>,
    },
    /// Print candidate project directories under a root, one per line
    Pick {
        #[arg(long)]
        root: PathBuf,
    },
    /// Handle one watcher event given as JSON
    Event { json: String },
    /// Handle newline-delimited JSON events from stdin until EOF
    Watch,
    /// List stored sessions
    List {
        /// Print a JSON array instead of one name per line
        #[arg(long)]
        json: bool,
    },
    /// Print a stored session as JSON
    Show { name: String },
    /// Delete a stored session
    Forget { name: String },
    /// Print the effective configuration as TOML
    Config {
        /// Print built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<sessionkeep_core::Error>() {
        Some(core) => format_error_with_remediation(core),
        None => format!("Error: {err:#}"),
    }
}

fn load_config(cli: &Cli) -> sessionkeep_core::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Defaults must print even when the config file is broken.
    if let Commands::Config { defaults: true } = cli.command {
        return commands::config(&Config::default());
    }

    let config = load_config(&cli)?;
    init_logging(&config.logging).map_err(sessionkeep_core::Error::from)?;
    tracing::debug!(version = sessionkeep_core::VERSION, "sk starting");

    match cli.command {
        Commands::Open { dir, origin } => commands::open(&config, &dir, origin).await,
        Commands::Pick { root } => commands::pick(&root),
        Commands::Event { json } => commands::event(&config, &json).await,
        Commands::Watch => commands::watch(&config).await,
        Commands::List { json } => commands::list(&config, json),
        Commands::Show { name } => commands::show(&config, &name),
        Commands::Forget { name } => commands::forget(&config, &name),
        Commands::Config { .. } => commands::config(&config),
    }
}
