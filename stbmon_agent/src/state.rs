//! Shared agent state: sensors, config, subscriber registry, and the hot
//! snapshot cache.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::broadcast::Broadcaster;
use crate::config::{Config, ConfigStore};
use crate::sensors::SensorSource;
use crate::types::Snapshot;

pub type SharedSensors = Arc<Mutex<Box<dyn SensorSource>>>;
pub type SharedConfig = Arc<RwLock<Config>>;
pub type SharedSnapshot = Arc<RwLock<Option<Arc<Snapshot>>>>;

#[derive(Clone)]
pub struct AppState {
    // Sensors and their CPU baselines; locked for the duration of one read
    pub sensors: SharedSensors,
    pub config: SharedConfig,
    pub config_store: Arc<ConfigStore>,
    pub broadcaster: Arc<Broadcaster>,

    // Last snapshot built by the sampler, for fast HTTP replies
    pub latest: SharedSnapshot,
    pub hostname: String,
}

impl AppState {
    pub fn new(config: Config, sensors: Box<dyn SensorSource>, config_store: ConfigStore) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .unwrap_or_else(|| "stb".to_string());
        Self {
            sensors: Arc::new(Mutex::new(sensors)),
            config: Arc::new(RwLock::new(config)),
            config_store: Arc::new(config_store),
            broadcaster: Arc::new(Broadcaster::new()),
            latest: Arc::new(RwLock::new(None)),
            hostname,
        }
    }
}
