//! Automix CLI - Effect Automation and Rendering Engine
//!
//! Command-line interface for rendering and inspecting projects.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use automix::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("Automix v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Render {
            project,
            clips,
            out,
            format,
        } => commands::render(&config, &project, &clips, &out, format.as_deref())
            .with_context(|| format!("failed to render {}", project.display()))?,
        Commands::Inspect { project, measure } => commands::inspect(&config, &project, measure)
            .with_context(|| format!("failed to inspect {}", project.display()))?,
        Commands::Checksum { project, clips } => commands::checksum(&config, &project, &clips)
            .with_context(|| format!("failed to checksum {}", project.display()))?,
    }

    Ok(())
}
