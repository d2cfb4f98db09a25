#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for damage assessment projects.
//!
//! Reads configuration from the file named by `DAMAGE_MAP_CONFIG` (or
//! defaults) and serves the API on `BIND_ADDR`:`PORT`.

use damage_map_assessment::EngineConfig;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = EngineConfig::load(None)?;
    damage_map_server::serve(config).await?;

    Ok(())
}
