//! Alert/polling configuration: defaults, JSON file lookup, and persistence.
//! Stored as `monitor_config.json` under $XDG_CONFIG_HOME/stbmon (fallback
//! ~/.config/stbmon), with ./monitor_config.json as a second candidate.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONFIG_FILE_NAME: &str = "monitor_config.json";
pub const MIN_POLL_SECS: f64 = 1.0;
pub const MAX_POLL_SECS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub alerts_enabled: bool,
    #[serde(rename = "ram_threshold")]
    pub ram_threshold_pct: f64,
    #[serde(rename = "temp_threshold")]
    pub temp_threshold_c: f64,
    #[serde(rename = "storage_threshold")]
    pub disk_threshold_pct: f64,
    #[serde(rename = "polling_interval_sec")]
    pub poll_interval_sec: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alerts_enabled: true,
            ram_threshold_pct: 90.0,
            temp_threshold_c: 75.0,
            disk_threshold_pct: 90.0,
            poll_interval_sec: 3.0,
        }
    }
}

impl Config {
    /// Sampling period, clamped to 1..=10 seconds whatever the file says.
    pub fn poll_interval(&self) -> Duration {
        let secs = if self.poll_interval_sec.is_finite() {
            self.poll_interval_sec.clamp(MIN_POLL_SECS, MAX_POLL_SECS)
        } else {
            Config::default().poll_interval_sec
        };
        Duration::from_secs_f64(secs)
    }

    /// Merge a parsed JSON object over the defaults one key at a time. A key
    /// with an unusable value keeps its default; the other keys still apply.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut cfg = Config::default();
        if let Some(v) = map.get("alerts_enabled") {
            set(&mut cfg.alerts_enabled, "alerts_enabled", flag(v));
        }
        let numbers = [
            ("ram_threshold", &mut cfg.ram_threshold_pct),
            ("temp_threshold", &mut cfg.temp_threshold_c),
            ("storage_threshold", &mut cfg.disk_threshold_pct),
            ("polling_interval_sec", &mut cfg.poll_interval_sec),
        ];
        for (key, slot) in numbers {
            if let Some(v) = map.get(key) {
                set(slot, key, number(v));
            }
        }
        cfg
    }
}

fn set<T>(slot: &mut T, key: &str, parsed: Option<T>) {
    match parsed {
        Some(v) => *slot = v,
        None => warn!(key, "ignoring unusable config value, keeping default"),
    }
}

/// Finite number, or a string holding one.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for Config {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(|map| Config::from_map(&map))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serializing config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unable to write config to any known location")]
    NoWritableLocation,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("stbmon")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stbmon")
    }
}

/// Where the config is read from and written back to.
#[derive(Debug)]
pub struct ConfigStore {
    candidates: Vec<PathBuf>,
    loaded_from: Mutex<Option<PathBuf>>,
}

impl ConfigStore {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            loaded_from: Mutex::new(None),
        }
    }

    /// An explicit path (flag or STBMON_CONFIG) goes first; the user config
    /// dir and the working directory follow.
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        let explicit = explicit.or_else(|| std::env::var_os("STBMON_CONFIG").map(PathBuf::from));
        let mut candidates: Vec<PathBuf> = explicit.into_iter().collect();
        candidates.push(config_dir().join(CONFIG_FILE_NAME));
        candidates.push(PathBuf::from(CONFIG_FILE_NAME));
        Self::new(candidates)
    }

    pub fn loaded_from(&self) -> Option<PathBuf> {
        self.loaded_from.lock().ok().and_then(|g| g.clone())
    }

    /// First candidate that exists and parses wins; missing keys take their
    /// defaults. Falls back to [`Config::default`] when nothing is usable.
    pub fn load(&self) -> Config {
        for path in &self.candidates {
            if !path.exists() {
                continue;
            }
            match read_config(path) {
                Ok(cfg) => {
                    info!(path = %path.display(), "loaded config");
                    if let Ok(mut g) = self.loaded_from.lock() {
                        *g = Some(path.clone());
                    }
                    return cfg;
                }
                Err(e) => warn!("{e}"),
            }
        }
        debug!("no config file found, using defaults");
        Config::default()
    }

    /// Write to the file the config came from, else the first candidate
    /// that accepts the write. Returns the path written.
    pub fn save(&self, cfg: &Config) -> Result<PathBuf, ConfigError> {
        let data = serde_json::to_vec_pretty(cfg)?;
        let targets = self.loaded_from().into_iter().chain(self.candidates.iter().cloned());
        for path in targets {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(path = %parent.display(), error = %e, "cannot create config dir");
                    continue;
                }
            }
            match fs::write(&path, &data) {
                Ok(()) => {
                    if let Ok(mut g) = self.loaded_from.lock() {
                        *g = Some(path.clone());
                    }
                    return Ok(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to write config"),
            }
        }
        Err(ConfigError::NoWritableLocation)
    }
}

pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"ram_threshold": 80, "alerts_enabled": false}"#).unwrap();

        let store = ConfigStore::new(vec![path.clone()]);
        let cfg = store.load();
        assert_eq!(cfg.ram_threshold_pct, 80.0);
        assert!(!cfg.alerts_enabled);
        assert_eq!(cfg.temp_threshold_c, 75.0);
        assert_eq!(cfg.disk_threshold_pct, 90.0);
        assert_eq!(cfg.poll_interval_sec, 3.0);
        assert_eq!(store.loaded_from(), Some(path));
    }

    #[test]
    fn broken_candidate_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        let good = dir.path().join("good.json");
        fs::write(&broken, "{not json").unwrap();
        fs::write(&good, r#"{"temp_threshold": 70}"#).unwrap();

        let store = ConfigStore::new(vec![dir.path().join("missing.json"), broken, good.clone()]);
        assert_eq!(store.load().temp_threshold_c, 70.0);
        assert_eq!(store.loaded_from(), Some(good));
    }

    #[test]
    fn nothing_usable_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(vec![dir.path().join("nope.json")]);
        assert_eq!(store.load(), Config::default());
        assert_eq!(store.loaded_from(), None);
    }

    #[test]
    fn poll_interval_is_clamped() {
        let mut cfg = Config::default();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(3));
        cfg.poll_interval_sec = 0.0;
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        cfg.poll_interval_sec = -4.0;
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        cfg.poll_interval_sec = 60.0;
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
        cfg.poll_interval_sec = 2.5;
        assert_eq!(cfg.poll_interval(), Duration::from_millis(2500));
        cfg.poll_interval_sec = f64::NAN;
        assert_eq!(cfg.poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn save_writes_back_to_loaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let second = dir.path().join("second.json");
        fs::write(&second, "{}").unwrap();

        let store = ConfigStore::new(vec![first.clone(), second.clone()]);
        let mut cfg = store.load();
        cfg.alerts_enabled = false;
        assert_eq!(store.save(&cfg).unwrap(), second);
        assert!(!first.exists());
        assert!(!read_config(&second).unwrap().alerts_enabled);
    }

    #[test]
    fn save_creates_first_candidate_when_nothing_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stbmon").join(CONFIG_FILE_NAME);
        let store = ConfigStore::new(vec![path.clone()]);
        let cfg = Config {
            poll_interval_sec: 5.0,
            ..Config::default()
        };
        assert_eq!(store.save(&cfg).unwrap(), path);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"polling_interval_sec\": 5.0"), "{text}");
        assert_eq!(read_config(&path).unwrap(), cfg);
    }

    #[test]
    fn bad_value_costs_only_its_own_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"{"alerts_enabled": false, "ram_threshold": 80, "temp_threshold": "hot", "polling_interval_sec": 2.5}"#,
        )
        .unwrap();

        let cfg = ConfigStore::new(vec![path.clone()]).load();
        assert!(!cfg.alerts_enabled);
        assert_eq!(cfg.ram_threshold_pct, 80.0);
        assert_eq!(cfg.temp_threshold_c, 75.0);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn numeric_strings_and_flag_spellings_are_accepted() {
        let cfg: Config = serde_json::from_str(
            r#"{"alerts_enabled": "off", "ram_threshold": "85", "storage_threshold": " 70.5 ", "polling_interval_sec": null}"#,
        )
        .unwrap();
        assert!(!cfg.alerts_enabled);
        assert_eq!(cfg.ram_threshold_pct, 85.0);
        assert_eq!(cfg.disk_threshold_pct, 70.5);
        assert_eq!(cfg.poll_interval_sec, 3.0);
    }

    #[test]
    fn non_object_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(read_config(&path).is_err());
        assert_eq!(ConfigStore::new(vec![path]).load(), Config::default());
    }
}
