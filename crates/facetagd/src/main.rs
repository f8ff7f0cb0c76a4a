use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{FaceTagService, BUS_NAME, OBJECT_PATH};
use engine::{spawn_engine, EngineSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facetagd starting");

    let config = Config::load()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        provider = %config.default_provider,
        min_confidence = config.min_confidence,
        training_delay_ms = config.training_delay_ms,
        bus = ?config.bus,
        "configuration loaded"
    );

    let engine = spawn_engine(EngineSettings {
        data_dir: config.data_dir.clone(),
        default_provider: config.default_provider.clone(),
        latency_scale: config.latency_scale,
        seed_demo_data: config.seed_demo_data,
        rng_seed: config.rng_seed,
    })?;

    let service = FaceTagService::new(
        engine,
        config.min_confidence,
        Duration::from_millis(config.training_delay_ms),
    );

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "facetagd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facetagd shutting down");

    Ok(())
}
