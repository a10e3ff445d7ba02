// crates/counsel-server/src/main.rs
// Counsel - Multi-Model Deliberation Server with Decision Graph Memory

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet on stderr for MCP stdio; graph inspection is interactive
    let log_level = match &cli.command {
        None | Some(Commands::Serve) => Level::WARN,
        Some(Commands::Graph { .. }) => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => {
            cli::run_mcp_server(cli.config.as_deref()).await?;
        }
        Some(Commands::Graph { action }) => {
            cli::run_graph(cli.config.as_deref(), action).await?;
        }
    }

    Ok(())
}
