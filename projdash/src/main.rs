//! projdash - local project inventory CLI
//!
//! Scans a dev root, scores every project and keeps user annotations and
//! optional LLM analysis in a local SQLite database.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (stderr keeps stdout clean for --json and export)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("projdash=warn".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = projdash_core::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Refresh(args) => commands::refresh::execute(args, &config).await,
        Commands::List(args) => commands::list::execute(args, &config).await,
        Commands::Show { project, json } => commands::show::execute(&project, json, &config).await,
        Commands::Override(args) => commands::update::execute_override(args, &config).await,
        Commands::Meta(args) => commands::update::execute_meta(args, &config).await,
        Commands::Pin { project } => commands::pin::execute(&project, &config).await,
        Commands::Activity { project, limit } => {
            commands::activity::execute(&project, limit, &config).await
        }
        Commands::Export { output } => commands::export::execute(output.as_deref(), &config).await,
        Commands::Doctor => commands::doctor::execute(&config).await,
        Commands::Version => {
            println!("projdash {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
