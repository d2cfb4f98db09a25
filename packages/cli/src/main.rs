#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the damage map toolchain.
//!
//! `assess` runs the full pipeline offline on a scene file with progress
//! bars, `validate-scene` checks a scene before use, `import-scene` stores
//! a scene for a server project, and `serve` starts the HTTP API.
//!
//! Uses `indicatif-log-bridge` (via [`damage_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use damage_map_assessment::EngineConfig;

#[derive(Parser)]
#[command(name = "damage_map", about = "Satellite damage assessment toolchain")]
struct Cli {
    /// Engine configuration file (overrides `DAMAGE_MAP_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a before/after scene file and print the damage summary
    Assess(commands::AssessArgs),
    /// Check that a scene file can be assessed
    ValidateScene(commands::SceneArgs),
    /// Store a scene file in the scenes directory for a project
    ImportScene(commands::ImportArgs),
    /// Start the HTTP API server
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = damage_map_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Assess(args) => commands::assess(&multi, config, args).await?,
        Commands::ValidateScene(args) => commands::validate_scene(&config, &args).await?,
        Commands::ImportScene(args) => commands::import_scene(&config, &args).await?,
        Commands::Serve => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(damage_map_server::serve(config))
            })
            .await??;
        }
    }

    Ok(())
}
