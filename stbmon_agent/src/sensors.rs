//! Sensor probes for memory, disk, temperature, and uptime.
//!
//! Every sensor is an ordered chain of strategies; the first one that yields
//! a value wins and a sensor whose chain is exhausted reports `None`. No
//! probe failure ever escapes this module.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use sysinfo::{Components, MemoryRefreshKind, System};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::cpu::CpuSampler;
use crate::snapshot::round1;

const MEMINFO: &str = "/proc/meminfo";
const UPTIME: &str = "/proc/uptime";
const DISK_TARGETS: [&str; 2] = ["/", "/data"];
const THERMAL_ZONES: [&str; 2] = [
    "/sys/class/thermal/thermal_zone0/temp",
    "/sys/devices/virtual/thermal/thermal_zone0/temp",
];

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Parse(String),
    #[error("{0} not found")]
    Missing(&'static str),
    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },
    #[error("`{0}` timed out")]
    Timeout(String),
}

// Runtime toggles (read once)
fn temp_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("STBMON_TEMP")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

fn df_timeout() -> Duration {
    static MS: OnceCell<u64> = OnceCell::new();
    Duration::from_millis(*MS.get_or_init(|| {
        std::env::var("STBMON_DF_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000)
    }))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: f64,
}

impl MemoryUsage {
    pub fn from_total_available(total: u64, available: u64) -> Result<Self, SensorError> {
        if total == 0 {
            return Err(SensorError::Parse("total memory reported as 0".into()));
        }
        let used = total.saturating_sub(available);
        Ok(Self {
            total_bytes: total,
            used_bytes: used,
            percent: round1(used as f64 / total as f64 * 100.0),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: Option<f64>,
}

/// Raw output of one pass over every sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReadings {
    pub cpu_percent: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub disk: Option<DiskUsage>,
    pub temp_c: Option<f64>,
    pub uptime_sec: Option<f64>,
}

/// Anything the sampler can pull a full set of readings from.
pub trait SensorSource: Send {
    /// Take a throwaway CPU sample so the next read has a baseline.
    fn prime(&mut self) {}

    fn read(&mut self) -> BoxFuture<'_, SensorReadings>;
}

/// One strategy in a fallback chain.
pub trait Probe<T>: Send {
    fn name(&self) -> &'static str;
    fn probe(&mut self) -> Result<T, SensorError>;
}

pub struct ProbeChain<T> {
    sensor: &'static str,
    probes: Vec<Box<dyn Probe<T>>>,
}

impl<T> ProbeChain<T> {
    pub fn new(sensor: &'static str) -> Self {
        Self {
            sensor,
            probes: Vec::new(),
        }
    }

    pub fn with(mut self, probe: impl Probe<T> + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    pub fn read(&mut self) -> Option<T> {
        for p in &mut self.probes {
            match p.probe() {
                Ok(v) => return Some(v),
                Err(e) => debug!(sensor = self.sensor, probe = p.name(), error = %e, "probe failed"),
            }
        }
        None
    }
}

fn read_text(path: &Path) -> Result<String, SensorError> {
    fs::read_to_string(path).map_err(|source| SensorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ---------- Memory ----------

pub struct SysinfoMemory {
    sys: System,
}

impl SysinfoMemory {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe<MemoryUsage> for SysinfoMemory {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn probe(&mut self) -> Result<MemoryUsage, SensorError> {
        self.sys
            .refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        MemoryUsage::from_total_available(self.sys.total_memory(), self.sys.available_memory())
    }
}

pub struct MeminfoFile {
    path: PathBuf,
}

impl MeminfoFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Probe<MemoryUsage> for MeminfoFile {
    fn name(&self) -> &'static str {
        "meminfo"
    }

    fn probe(&mut self) -> Result<MemoryUsage, SensorError> {
        parse_meminfo(&read_text(&self.path)?)
    }
}

/// `MemTotal` and `MemAvailable` (kB) from /proc/meminfo.
pub fn parse_meminfo(text: &str) -> Result<MemoryUsage, SensorError> {
    let field = |key: &'static str| -> Result<u64, SensorError> {
        let line = text
            .lines()
            .find_map(|l| l.split_once(':').filter(|(k, _)| k.trim() == key))
            .ok_or(SensorError::Missing(key))?;
        let kb = line
            .1
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| SensorError::Parse(format!("bad {key} value {:?}", line.1.trim())))?;
        Ok(kb.saturating_mul(1024))
    };
    MemoryUsage::from_total_available(field("MemTotal")?, field("MemAvailable")?)
}

// ---------- Temperature ----------

pub struct ThermalZoneFile {
    path: PathBuf,
}

impl ThermalZoneFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Probe<f64> for ThermalZoneFile {
    fn name(&self) -> &'static str {
        "thermal-zone"
    }

    fn probe(&mut self) -> Result<f64, SensorError> {
        parse_millidegrees(&read_text(&self.path)?)
    }
}

/// Thermal zone files hold millidegrees Celsius.
pub fn parse_millidegrees(raw: &str) -> Result<f64, SensorError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| round1(v / 1000.0))
        .ok_or_else(|| SensorError::Parse(format!("bad thermal reading {:?}", raw.trim())))
}

/// Last resort: whatever hwmon sensor sysinfo finds with a CPU-ish label.
pub struct SysinfoComponents {
    components: Components,
}

impl SysinfoComponents {
    pub fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoComponents {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe<f64> for SysinfoComponents {
    fn name(&self) -> &'static str {
        "sysinfo-components"
    }

    fn probe(&mut self) -> Result<f64, SensorError> {
        self.components.refresh(false);
        self.components
            .iter()
            .find_map(|c| {
                let l = c.label().to_ascii_lowercase();
                if l.contains("cpu") || l.contains("package") || l.contains("tctl") || l.contains("tdie") {
                    c.temperature()
                } else {
                    None
                }
            })
            .filter(|t| t.is_finite())
            .map(|t| round1(f64::from(t)))
            .ok_or(SensorError::Missing("cpu temperature component"))
    }
}

// ---------- Uptime ----------

pub struct SysinfoUptime;

impl Probe<f64> for SysinfoUptime {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn probe(&mut self) -> Result<f64, SensorError> {
        match System::uptime() {
            0 => Err(SensorError::Missing("uptime")),
            secs => Ok(secs as f64),
        }
    }
}

pub struct ProcUptime {
    path: PathBuf,
}

impl ProcUptime {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Probe<f64> for ProcUptime {
    fn name(&self) -> &'static str {
        "proc-uptime"
    }

    fn probe(&mut self) -> Result<f64, SensorError> {
        parse_proc_uptime(&read_text(&self.path)?)
    }
}

/// First field of /proc/uptime, seconds since boot.
pub fn parse_proc_uptime(text: &str) -> Result<f64, SensorError> {
    text.split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .ok_or_else(|| SensorError::Parse(format!("bad uptime {:?}", text.trim())))
}

// ---------- Disk ----------

/// `df -k` against each target in order until one answers.
pub struct DiskReader {
    targets: Vec<PathBuf>,
    timeout: Duration,
    program: String,
    args: Vec<String>,
}

impl DiskReader {
    pub fn new(targets: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            targets,
            timeout,
            program: "df".to_string(),
            args: vec!["-k".to_string()],
        }
    }

    /// Run something other than `df -k`; the target is appended as the last
    /// argument and stdout must look like df's.
    pub fn with_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub async fn read(&self) -> Option<DiskUsage> {
        for target in &self.targets {
            match self.query(target).await {
                Ok(usage) => return Some(usage),
                Err(e) => debug!(mount = %target.display(), error = %e, "disk probe failed"),
            }
        }
        None
    }

    async fn query(&self, target: &Path) -> Result<DiskUsage, SensorError> {
        let command = format!("{} {}", self.program, target.display());
        let run = Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .kill_on_drop(true)
            .output();
        let out = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| SensorError::Timeout(command.clone()))?
            .map_err(|e| SensorError::Command {
                command: command.clone(),
                detail: e.to_string(),
            })?;
        if !out.status.success() {
            return Err(SensorError::Command {
                command,
                detail: out.status.to_string(),
            });
        }
        parse_df_output(&String::from_utf8_lossy(&out.stdout))
    }
}

impl Default for DiskReader {
    fn default() -> Self {
        Self::new(DISK_TARGETS.iter().map(PathBuf::from).collect(), df_timeout())
    }
}

/// Parse `df -k` output: header, then filesystem, 1K-blocks, used, available,
/// use%. Some df builds wrap a long filesystem name onto its own line, so the
/// data rows are treated as one whitespace-separated run.
pub fn parse_df_output(out: &str) -> Result<DiskUsage, SensorError> {
    let cols: Vec<&str> = out
        .lines()
        .skip(1)
        .flat_map(str::split_whitespace)
        .take(5)
        .collect();
    if cols.len() < 3 {
        return Err(SensorError::Missing("df data row"));
    }
    let kib = |i: usize| -> Result<u64, SensorError> {
        cols[i]
            .parse::<u64>()
            .map(|v| v.saturating_mul(1024))
            .map_err(|_| SensorError::Parse(format!("bad df column {:?}", cols[i])))
    };
    Ok(DiskUsage {
        total_bytes: kib(1)?,
        used_bytes: kib(2)?,
        percent: cols
            .get(4)
            .and_then(|p| p.trim_end_matches('%').parse::<f64>().ok()),
    })
}

// ---------- All sensors ----------

/// The real device: /proc, /sys, sysinfo, and df.
pub struct SystemSensors {
    cpu: CpuSampler,
    memory: ProbeChain<MemoryUsage>,
    disk: DiskReader,
    temperature: ProbeChain<f64>,
    uptime: ProbeChain<f64>,
}

impl SystemSensors {
    pub fn new() -> Self {
        let mut temperature = ProbeChain::new("temperature");
        if temp_enabled() {
            for zone in THERMAL_ZONES {
                temperature = temperature.with(ThermalZoneFile::new(zone));
            }
            temperature = temperature.with(SysinfoComponents::new());
        }
        Self {
            cpu: CpuSampler::from_proc_stat(),
            memory: ProbeChain::new("memory")
                .with(SysinfoMemory::new())
                .with(MeminfoFile::new(MEMINFO)),
            disk: DiskReader::default(),
            temperature,
            uptime: ProbeChain::new("uptime")
                .with(SysinfoUptime)
                .with(ProcUptime::new(UPTIME)),
        }
    }
}

impl Default for SystemSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SystemSensors {
    fn prime(&mut self) {
        let _ = self.cpu.sample();
    }

    fn read(&mut self) -> BoxFuture<'_, SensorReadings> {
        Box::pin(async move {
            let cpu_percent = self.cpu.sample();
            let memory = self.memory.read();
            let disk = self.disk.read().await;
            let temp_c = self.temperature.read();
            let uptime_sec = self.uptime.read();
            SensorReadings {
                cpu_percent,
                memory,
                disk,
                temp_c,
                uptime_sec,
            }
        })
    }
}
