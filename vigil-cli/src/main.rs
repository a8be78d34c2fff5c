//! Vigil CLI - command line host for Vigil
//!
//! Model-assisted code review from the terminal, plus a stdio bridge that
//! lets an editor extension drive the same core.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{
    AnalyzeArgs, BridgeArgs, ChatArgs, ConfigArgs, ConversationsArgs, FixArgs, GlobalArgs,
    RulesArgs, ScanArgs,
};

/// Vigil: model-assisted code review
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model to use (overrides config and env)
    #[arg(long, global = true, env = "VIGIL_MODEL")]
    model: Option<String>,

    /// Chat-completions endpoint (overrides config and env)
    #[arg(long, global = true, env = "VIGIL_ENDPOINT")]
    endpoint: Option<String>,

    /// Workspace root
    #[arg(short = 'C', long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Analyze individual files
    #[command(visible_alias = "a")]
    Analyze(AnalyzeArgs),

    /// Analyze every supported file in the workspace
    Scan(ScanArgs),

    /// Generate and apply a fix for an anomaly
    Fix(FixArgs),

    /// Discuss an anomaly with the model
    Chat(ChatArgs),

    /// Manage stored conversations
    #[command(visible_alias = "conv")]
    Conversations(ConversationsArgs),

    /// Show the review rules in effect
    Rules(RulesArgs),

    /// Show or change configuration
    Config(ConfigArgs),

    /// Serve the UI message protocol over stdin/stdout
    Bridge(BridgeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries command output and bridge frames
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let global = GlobalArgs {
        verbose: cli.verbose,
        model: cli.model,
        endpoint: cli.endpoint,
        workspace: cli.workspace,
    };

    match cli.command {
        Some(Commands::Version) => {
            println!("vigil {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Analyze(args)) => args.execute(&global).await?,
        Some(Commands::Scan(args)) => args.execute(&global).await?,
        Some(Commands::Fix(args)) => args.execute(&global).await?,
        Some(Commands::Chat(args)) => args.execute(&global).await?,
        Some(Commands::Conversations(args)) => args.execute(&global).await?,
        Some(Commands::Rules(args)) => args.execute(&global).await?,
        Some(Commands::Config(args)) => args.execute(&global).await?,
        Some(Commands::Bridge(args)) => args.execute(&global).await?,
        None => {
            println!("Vigil - model-assisted code review");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
