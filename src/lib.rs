mod utils;

pub mod capture;
pub mod db;
pub mod export;
pub mod monitor;
pub mod posture;
pub mod settings;
pub mod stats;

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

pub use capture::{FrameSource, PoseEstimator, RawImage};
pub use db::{Check, Database, Session, StoreEvent};
pub use export::{ExportOptions, Exporter};
pub use monitor::{MonitorController, MonitorEvent, MonitorStatus};
pub use settings::{MonitorSettings, SettingsStore};
pub use stats::StatsAggregator;

const DATABASE_FILE: &str = "posture_statistics.db";
const SETTINGS_FILE: &str = "settings.json";

const LOG_FILTER_ENV: &str = "RUST_LOG";

fn logger_builder(filter_var: &str) -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(filter_var, "info"))
}

/// Initialise `env_logger` from `RUST_LOG`, falling back to `info` when unset.
pub fn init_logging() {
    let _ = logger_builder(LOG_FILTER_ENV).try_init();
}

/// Everything a front end needs, wired against one data directory.
pub struct PostureMonitor {
    pub db: Database,
    pub settings: SettingsStore,
    pub controller: MonitorController,
    pub stats: StatsAggregator,
    pub exporter: Exporter,
}

impl PostureMonitor {
    pub async fn open(
        data_dir: &Path,
        source: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DATABASE_FILE))?;

        // Close a session left open when the app last crashed.
        if let Some(session) = db.recover_open_session().await? {
            warn!(
                "Recovered session {} left open by a previous run",
                session.id
            );
        }

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
        let controller = MonitorController::new(source, estimator, db.clone(), settings.monitor())?;

        info!("Posture monitor ready in {}", data_dir.display());

        Ok(Self {
            stats: StatsAggregator::new(db.clone()),
            exporter: Exporter::new(db.clone()),
            db,
            settings,
            controller,
        })
    }

    /// Write the controller's current settings to the settings file.
    pub fn save_settings(&self) -> Result<()> {
        self.settings.update(self.controller.settings())
    }

    pub async fn close(&self) {
        self.controller.shutdown().await;
    }
}
