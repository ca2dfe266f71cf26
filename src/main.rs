// src/main.rs
mod allocator;
mod api;
mod catalog;
mod config;
mod luggage;
mod model;
mod packer;
mod planner;
mod remote;
mod types;

use config::AppConfig;
use log::{info, warn};

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let catalog = catalog::Catalog::default_fleet();

    info!("🚀 Load planning service starting...");
    api::start_api_server(
        app_config.api.clone(),
        app_config.remote.clone(),
        app_config.planning.planner_config(),
        catalog,
    )
    .await;
}
