//! CPU utilization from cumulative /proc/stat tick counters.
//!
//! Utilization needs two readings, so every counter source keeps its own
//! [`CpuUsageEstimator`] holding the previous sample. The aggregate `cpu ` line
//! is preferred; the per-core lines are only consulted when it cannot be read.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::sensors::SensorError;
use crate::snapshot::round1;

const PROC_STAT: &str = "/proc/stat";

/// Absolute idle/total tick counts at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    pub idle_ticks: u64,
    pub total_ticks: u64,
}

/// Turns successive [`CounterSample`]s into a busy percentage.
#[derive(Debug, Default)]
pub struct CpuUsageEstimator {
    baseline: Option<CounterSample>,
}

impl CpuUsageEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` until a baseline exists, and whenever the total did not
    /// advance (counter reset, reboot, or no elapsed ticks). The baseline is
    /// replaced on every call so a reset never leaves the estimator stuck.
    pub fn sample(&mut self, raw: CounterSample) -> Option<f64> {
        let prev = self.baseline.replace(raw)?;
        let total_diff = i128::from(raw.total_ticks) - i128::from(prev.total_ticks);
        if total_diff <= 0 {
            return None;
        }
        let idle_diff = i128::from(raw.idle_ticks) - i128::from(prev.idle_ticks);
        let busy = (total_diff - idle_diff) as f64;
        Some(round1(busy / total_diff as f64 * 100.0))
    }

    pub fn baseline(&self) -> Option<CounterSample> {
        self.baseline
    }
}

/// Somewhere cumulative CPU counters can be read from.
pub trait CounterSource: Send {
    fn name(&self) -> &'static str;
    fn read(&mut self) -> Result<CounterSample, SensorError>;
}

/// The aggregate `cpu ` line of /proc/stat.
pub struct ProcStatAggregate {
    path: PathBuf,
}

impl ProcStatAggregate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CounterSource for ProcStatAggregate {
    fn name(&self) -> &'static str {
        "proc-stat"
    }

    fn read(&mut self) -> Result<CounterSample, SensorError> {
        let text = read_text(&self.path)?;
        parse_aggregate(&text)
    }
}

/// Sum of the per-core `cpuN` lines of /proc/stat, counted the way libuv
/// reports per-core times (user, nice, system, irq, idle).
pub struct ProcStatPerCore {
    path: PathBuf,
}

impl ProcStatPerCore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CounterSource for ProcStatPerCore {
    fn name(&self) -> &'static str {
        "per-core"
    }

    fn read(&mut self) -> Result<CounterSample, SensorError> {
        let text = read_text(&self.path)?;
        parse_per_core(&text)
    }
}

fn read_text(path: &PathBuf) -> Result<String, SensorError> {
    fs::read_to_string(path).map_err(|source| SensorError::Io {
        path: path.clone(),
        source,
    })
}

fn fields(line: &str) -> Result<Vec<u64>, SensorError> {
    line.split_whitespace()
        .skip(1)
        .map(|tok| {
            tok.parse::<u64>()
                .map_err(|_| SensorError::Parse(format!("bad tick count {tok:?} in /proc/stat")))
        })
        .collect()
}

/// Parse the first `cpu ` line: idle = idle + iowait, busy = user + nice +
/// system + irq + softirq + steal. Older kernels omit the trailing columns.
pub fn parse_aggregate(stat: &str) -> Result<CounterSample, SensorError> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or(SensorError::Missing("cpu line in /proc/stat"))?;
    let v = fields(line)?;
    if v.len() < 4 {
        return Err(SensorError::Parse(format!(
            "expected at least 4 cpu columns, got {}",
            v.len()
        )));
    }
    let col = |i: usize| v.get(i).copied().unwrap_or(0);
    let idle = col(3).saturating_add(col(4));
    let busy = [0, 1, 2, 5, 6, 7]
        .iter()
        .fold(0u64, |acc, &i| acc.saturating_add(col(i)));
    Ok(CounterSample {
        idle_ticks: idle,
        total_ticks: idle.saturating_add(busy),
    })
}

/// Aggregate every `cpuN` line into one sample.
pub fn parse_per_core(stat: &str) -> Result<CounterSample, SensorError> {
    let mut idle = 0u64;
    let mut total = 0u64;
    let mut cores = 0usize;
    for line in stat.lines() {
        let is_core = line
            .strip_prefix("cpu")
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit());
        if !is_core {
            continue;
        }
        let v = fields(line)?;
        let col = |i: usize| v.get(i).copied().unwrap_or(0);
        idle = idle.saturating_add(col(3));
        total = [0, 1, 2, 5, 3]
            .iter()
            .fold(total, |acc, &i| acc.saturating_add(col(i)));
        cores += 1;
    }
    if cores == 0 {
        return Err(SensorError::Missing("per-core lines in /proc/stat"));
    }
    Ok(CounterSample {
        idle_ticks: idle,
        total_ticks: total,
    })
}

struct Tracked {
    source: Box<dyn CounterSource>,
    estimator: CpuUsageEstimator,
}

impl Tracked {
    fn new(source: Box<dyn CounterSource>) -> Self {
        Self {
            source,
            estimator: CpuUsageEstimator::new(),
        }
    }
}

/// Primary counter source with a fallback; each keeps its own baseline.
pub struct CpuSampler {
    primary: Tracked,
    fallback: Tracked,
}

impl CpuSampler {
    pub fn new(primary: Box<dyn CounterSource>, fallback: Box<dyn CounterSource>) -> Self {
        Self {
            primary: Tracked::new(primary),
            fallback: Tracked::new(fallback),
        }
    }

    pub fn from_proc_stat() -> Self {
        Self::new(
            Box::new(ProcStatAggregate::new(PROC_STAT)),
            Box::new(ProcStatPerCore::new(PROC_STAT)),
        )
    }

    /// Busy percentage since the previous call on whichever source could be
    /// read. The fallback only runs when the primary read fails.
    pub fn sample(&mut self) -> Option<f64> {
        for tracked in [&mut self.primary, &mut self.fallback] {
            match tracked.source.read() {
                Ok(raw) => return tracked.estimator.sample(raw),
                Err(e) => debug!(source = tracked.source.name(), error = %e, "cpu counters unreadable"),
            }
        }
        None
    }
}
