//! Battle engine binary for Warband.
//!
//! This is the main entry point that wires together configuration,
//! logging, the world store and the tick loop. It runs until the tick
//! limit is reached or the process receives Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `warband-config.yaml` (or `WARBAND_CONFIG`)
//! 2. Initialize structured logging (tracing), pretty or JSON
//! 3. Open the configured world store, seeding it when a seed file is set
//! 4. Run the tick loop
//! 5. Log the result and, for a memory store, write the world back

mod error;
mod totals;

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warband_core::config::{LogFormat, LoggingConfig, SimulationConfig, StoreBackend};
use warband_core::runner::{self, RunResult};
use warband_store::{DragonflyStore, MemoryStore, WorldStore};

use crate::error::EngineError;
use crate::totals::TotalsCallback;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "warband-config.yaml";

/// Application entry point for the battle engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the run itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so report the source
    //    once the subscriber exists.
    let (config, config_source) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!("warband-engine starting");
    match &config_source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        tick_interval_ms = config.world.tick_interval_ms,
        store = ?config.infrastructure.store,
        "Engine configured"
    );

    // 3-5. Open the store and run.
    let infra = &config.infrastructure;
    match infra.store {
        StoreBackend::Memory => {
            let store = match &infra.seed_file {
                Some(path) => MemoryStore::from_json_file(path)?,
                None => {
                    warn!("No seed file configured, starting from an empty world");
                    MemoryStore::new(serde_json::Value::Object(serde_json::Map::new()))
                }
            };
            run(&store, &config).await?;

            if infra.write_back {
                if let Some(path) = &infra.seed_file {
                    store.write_json_file(path).await?;
                    info!(path = %path.display(), "World written back");
                } else {
                    warn!("write_back is set but there is no seed file to write to");
                }
            }
        }
        StoreBackend::Dragonfly => {
            info!(url = infra.dragonfly_url, namespace = infra.namespace, "Connecting to Dragonfly");
            let store = DragonflyStore::connect(&infra.dragonfly_url, &infra.namespace).await?;
            if let Some(path) = &infra.seed_file {
                let world = MemoryStore::from_json_file(path)?.tree().await;
                let stats = store.import(world).await?;
                info!(path = %path.display(), documents = stats.applied, "World imported");
            }
            run(&store, &config).await?;
        }
    }

    info!("warband-engine shutdown complete");
    Ok(())
}

/// Drive the tick loop against `store` until the tick limit or Ctrl-C.
async fn run<S: WorldStore>(store: &S, config: &SimulationConfig) -> Result<RunResult, EngineError> {
    let mut totals = TotalsCallback::default();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C, running until the tick limit");
            std::future::pending::<()>().await;
        }
    };

    let result = runner::run_simulation(store, config, &mut totals, shutdown).await?;
    runner::log_run_end(&result);
    totals.log();
    Ok(result)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match logging.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| EngineError::Logging {
        message: format!("{e}"),
    })
}

/// Load the engine configuration.
///
/// Reads the path in `WARBAND_CONFIG` when set, otherwise
/// `warband-config.yaml` in the working directory. A missing default file
/// yields the built-in defaults; a missing explicit file is an error.
fn load_config() -> Result<(SimulationConfig, Option<PathBuf>), EngineError> {
    if let Ok(explicit) = std::env::var("WARBAND_CONFIG") {
        let path = PathBuf::from(explicit);
        let config = SimulationConfig::from_file(&path)?;
        return Ok((config, Some(path)));
    }

    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        let config = SimulationConfig::from_file(config_path)?;
        Ok((config, Some(config_path.to_path_buf())))
    } else {
        Ok((SimulationConfig::parse("")?, None))
    }
}
