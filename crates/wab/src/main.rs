use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use wab_core::{bulk, config::Config, logging};

#[derive(Parser, Debug)]
#[command(name = "wab", about = "WhatsApp group bot", version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the gateway and handle commands (default)
    Run,
    /// Convert an exported chat log into a numbered-message file
    Extract {
        /// Exported chat log
        input: PathBuf,
        /// Numbered-message file to write
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), wab_core::Error> {
    let cli = Cli::parse();
    let log = logging::init("wab", cli.debug)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot(&log, cli.debug).await,
        Commands::Extract { input, output } => extract(input, output).await,
    }
}

async fn run_bot(log: &logging::LogHandle, debug: bool) -> Result<(), wab_core::Error> {
    let cfg = Arc::new(Config::load()?);
    if cfg.enable_debug_logs && !debug {
        log.set_verbose(true)?;
    }

    wab_gateway::router::run(cfg)
        .await
        .map_err(|e| wab_core::Error::External(format!("bot failed: {e:#}")))?;

    Ok(())
}

async fn extract(input: PathBuf, output: PathBuf) -> Result<(), wab_core::Error> {
    let (count, input, output) = tokio::task::spawn_blocking(move || {
        bulk::extract_messages(&input, &output).map(|count| (count, input, output))
    })
    .await
    .map_err(|e| wab_core::Error::External(format!("extract task failed: {e}")))??;

    tracing::info!(
        count,
        input = %input.display(),
        output = %output.display(),
        "extracted messages"
    );
    println!("Extracted {count} message(s) to {}", output.display());
    Ok(())
}
