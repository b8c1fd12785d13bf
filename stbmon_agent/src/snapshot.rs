//! Composition of raw sensor readings and config into a [`Snapshot`].

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::sensors::SensorReadings;
use crate::types::{DiskInfo, RamInfo, Snapshot, Thresholds};

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Decimal gigabytes, two places.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / 1e9)
}

pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Pure and total: every combination of missing readings still yields a
/// complete snapshot.
pub fn build_snapshot(readings: &SensorReadings, config: &Config, timestamp_ms: i64) -> Snapshot {
    Snapshot {
        cpu_percent: readings.cpu_percent,
        ram: readings.memory.map(|m| RamInfo {
            total_gb: bytes_to_gb(m.total_bytes),
            used_gb: bytes_to_gb(m.used_bytes),
            percent: m.percent,
        }),
        disk: readings.disk.map(|d| DiskInfo {
            total_gb: bytes_to_gb(d.total_bytes),
            used_gb: bytes_to_gb(d.used_bytes),
            percent: d.percent,
        }),
        temp_c: readings.temp_c,
        uptime_sec: readings.uptime_sec,
        alerts_enabled: config.alerts_enabled,
        thresholds: Thresholds {
            ram: config.ram_threshold_pct,
            temp: config.temp_threshold_c,
            disk: config.disk_threshold_pct,
        },
        timestamp_ms,
    }
}
