//! Data types served to dashboard, SSE, and WebSocket clients.
//! Keep this module minimal and stable; it defines the wire format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RamInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    // None when df printed something other than a number in the Use% column
    pub percent: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub ram: f64,
    pub temp: f64,
    pub disk: f64,
}

/// One tick's worth of measurements. Built once, then shared read-only.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cpu_percent: Option<f64>,
    pub ram: Option<RamInfo>,
    pub disk: Option<DiskInfo>,
    pub temp_c: Option<f64>,
    pub uptime_sec: Option<f64>,
    pub alerts_enabled: bool,
    pub thresholds: Thresholds,
    pub timestamp_ms: i64,
}
