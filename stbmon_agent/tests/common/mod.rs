//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use stbmon_agent::config::{Config, ConfigStore};
use stbmon_agent::notify::Notifier;
use stbmon_agent::sensors::{DiskUsage, MemoryUsage, SensorReadings, SensorSource};
use stbmon_agent::state::AppState;

/// Always returns the same readings.
pub struct FixedSensors(pub SensorReadings);

impl SensorSource for FixedSensors {
    fn read(&mut self) -> BoxFuture<'_, SensorReadings> {
        let r = self.0.clone();
        Box::pin(async move { r })
    }
}

/// Collects every message instead of sending it anywhere.
#[derive(Clone, Default)]
pub struct Outbox(pub Arc<Mutex<Vec<String>>>);

impl Outbox {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for Outbox {
    fn notify(&self, message: String) {
        self.0.lock().unwrap().push(message);
    }
}

/// RAM at 92%, 60°C, disk half full, one hour of uptime.
pub fn busy_box() -> SensorReadings {
    SensorReadings {
        cpu_percent: Some(12.5),
        memory: Some(MemoryUsage::from_total_available(1_000_000_000, 80_000_000).unwrap()),
        disk: Some(DiskUsage {
            total_bytes: 8_000_000_000,
            used_bytes: 4_000_000_000,
            percent: Some(50.0),
        }),
        temp_c: Some(60.0),
        uptime_sec: Some(3600.0),
    }
}

pub fn state_with(readings: SensorReadings, store: ConfigStore) -> AppState {
    AppState::new(Config::default(), Box::new(FixedSensors(readings)), store)
}
