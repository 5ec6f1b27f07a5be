mod commands;
mod config;
mod error;
mod manifest;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::commands::{Context, Control};
use crate::config::Config;
use crate::error::CliError;
use crate::manifest::parse_tag;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Compile and step tag-conditioned activity graphs.
#[derive(Parser)]
#[command(
    name = "choreo",
    version,
    about = "Compile and step tag-conditioned activity graphs"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to the configuration file (default: ./choreo.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the compiled cache and journals
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every tag vector of the manifests' units into the cache
    Compile {
        /// Unit manifest files
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },

    /// Print the activity a manifest compiles to for the given tags
    Show {
        /// Unit manifest file
        manifest: PathBuf,
        /// Tag value, repeatable
        #[arg(long = "tag", value_name = "NAME=VALUE", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },

    /// Compile a manifest, start an activity and yield its first step
    Start {
        /// Unit manifest file
        manifest: PathBuf,
        /// Tag value, repeatable
        #[arg(long = "tag", value_name = "NAME=VALUE", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },

    /// Settle the pending step as done and yield the next one
    Next {
        /// Journal id
        journal: String,
    },

    /// Settle the pending step with a decision (true/false, a number or a name)
    Decide {
        /// Journal id
        journal: String,
        value: String,
    },

    /// Settle the pending step as failed
    Fail {
        /// Journal id
        journal: String,
        message: String,
    },

    /// Choose the branch of a pending split and yield its first step
    Follow {
        /// Journal id
        journal: String,
        branch: String,
    },

    /// Stop handing out steps
    Pause {
        /// Journal id
        journal: String,
    },

    /// Undo a pause
    Resume {
        /// Journal id
        journal: String,
    },

    /// Show where an activity stands
    Status {
        /// Journal id
        journal: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e.to_string(), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_tracing(&config.log.level, cli.verbose);

    let ctx = Context {
        output: cli.output,
        quiet: cli.quiet,
        state_dir: cli.state_dir.unwrap_or(config.storage.state_dir),
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run(cli.command, &ctx)) {
        report_error(&e.to_string(), cli.output, cli.quiet);
        process::exit(1);
    }
}

async fn run(command: Commands, ctx: &Context) -> Result<(), CliError> {
    match command {
        Commands::Compile { manifests } => commands::cmd_compile(ctx, manifests).await,
        Commands::Show { manifest, tags } => {
            commands::cmd_show(ctx, manifest, tags.into_iter().collect()).await
        }
        Commands::Start { manifest, tags } => {
            commands::cmd_start(ctx, manifest, tags.into_iter().collect()).await
        }
        Commands::Next { journal } => commands::cmd_advance(ctx, &journal, Control::Next).await,
        Commands::Decide { journal, value } => {
            commands::cmd_advance(ctx, &journal, Control::Decide(value)).await
        }
        Commands::Fail { journal, message } => {
            commands::cmd_advance(ctx, &journal, Control::Fail(message)).await
        }
        Commands::Follow { journal, branch } => {
            commands::cmd_advance(ctx, &journal, Control::Follow(branch)).await
        }
        Commands::Pause { journal } => commands::cmd_hold(ctx, &journal, true).await,
        Commands::Resume { journal } => commands::cmd_hold(ctx, &journal, false).await,
        Commands::Status { journal } => commands::cmd_status(ctx, &journal).await,
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` or the configured level.
fn init_tracing(level: &str, verbose: bool) {
    let default = if verbose { "debug" } else { level };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
