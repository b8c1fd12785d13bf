//! Threshold alerts with an independent cooldown per alert kind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::Config;
use crate::notify::Notifier;
use crate::types::Snapshot;

pub const ALERT_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Ram,
    Temp,
    Disk,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [AlertKind::Ram, AlertKind::Temp, AlertKind::Disk];

    fn index(self) -> usize {
        match self {
            AlertKind::Ram => 0,
            AlertKind::Temp => 1,
            AlertKind::Disk => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Ram => "ram",
            AlertKind::Temp => "temp",
            AlertKind::Disk => "disk",
        }
    }

    /// The current value this kind watches, if the snapshot has it.
    pub fn metric(self, snapshot: &Snapshot) -> Option<f64> {
        match self {
            AlertKind::Ram => snapshot.ram.as_ref().map(|r| r.percent),
            AlertKind::Temp => snapshot.temp_c,
            AlertKind::Disk => snapshot.disk.as_ref().and_then(|d| d.percent),
        }
    }

    pub fn threshold(self, config: &Config) -> f64 {
        match self {
            AlertKind::Ram => config.ram_threshold_pct,
            AlertKind::Temp => config.temp_threshold_c,
            AlertKind::Disk => config.disk_threshold_pct,
        }
    }
}

/// Telegram-flavoured HTML, in the wording the device owners are used to.
pub fn render_message(kind: AlertKind, value: f64, uptime_sec: f64) -> String {
    let hours = uptime_sec / 3600.0;
    let (headline, line) = match kind {
        AlertKind::Ram => ("🚨 <b>STB RAM ALERT</b>", format!("💾 RAM: <b>{value:.1}%</b>")),
        AlertKind::Temp => (
            "🔥 <b>STB TEMPERATURE ALERT</b>",
            format!("🌡 Suhu CPU: <b>{value:.1}°C</b>"),
        ),
        AlertKind::Disk => (
            "💾 <b>STB STORAGE ALERT</b>",
            format!("📂 Storage: <b>{value:.1}%</b>"),
        ),
    };
    format!("{headline}\n\n{line}\n⏱ Uptime: {hours:.2} jam")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredAlert {
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

pub struct AlertEngine {
    notifier: Arc<dyn Notifier>,
    cooldown: Duration,
    // indexed by AlertKind::index; None = never fired
    last_fired: [Option<Instant>; 3],
}

impl AlertEngine {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            cooldown: ALERT_COOLDOWN,
            last_fired: [None; 3],
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn last_fired(&self, kind: AlertKind) -> Option<Instant> {
        self.last_fired[kind.index()]
    }

    fn cooled_down(&self, kind: AlertKind, now: Instant) -> bool {
        self.last_fired[kind.index()]
            .map_or(true, |at| now.saturating_duration_since(at) > self.cooldown)
    }

    /// Check every kind against `config` and notify for those that crossed
    /// their threshold and are out of cooldown. `now` is monotonic time.
    ///
    /// Nothing is evaluated while alerts are disabled or before uptime is
    /// known, which is taken as a sign the sensors have not produced a real
    /// sample yet.
    pub fn evaluate(&mut self, snapshot: &Snapshot, config: &Config, now: Instant) -> Vec<FiredAlert> {
        let Some(uptime) = snapshot.uptime_sec.filter(|_| config.alerts_enabled) else {
            return Vec::new();
        };
        let mut fired = Vec::new();
        for kind in AlertKind::ALL {
            let Some(value) = kind.metric(snapshot) else {
                continue;
            };
            let threshold = kind.threshold(config);
            if value < threshold || !self.cooled_down(kind, now) {
                continue;
            }
            let message = render_message(kind, value, uptime);
            self.notifier.notify(message.clone());
            self.last_fired[kind.index()] = Some(now);
            fired.push(FiredAlert {
                kind,
                value,
                threshold,
                message,
            });
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiskInfo, RamInfo, Thresholds};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<String>>);

    impl Notifier for Outbox {
        fn notify(&self, message: String) {
            self.0.lock().unwrap().push(message);
        }
    }

    fn snapshot(ram: Option<f64>, temp: Option<f64>, disk: Option<Option<f64>>) -> Snapshot {
        Snapshot {
            cpu_percent: Some(5.0),
            ram: ram.map(|percent| RamInfo {
                total_gb: 2.0,
                used_gb: 1.8,
                percent,
            }),
            disk: disk.map(|percent| DiskInfo {
                total_gb: 8.0,
                used_gb: 4.0,
                percent,
            }),
            temp_c: temp,
            uptime_sec: Some(3600.0),
            alerts_enabled: true,
            thresholds: Thresholds {
                ram: 90.0,
                temp: 75.0,
                disk: 90.0,
            },
            timestamp_ms: 0,
        }
    }

    fn engine() -> (AlertEngine, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::default());
        (AlertEngine::new(outbox.clone()), outbox)
    }

    #[test]
    fn one_alert_per_cooldown_window() {
        let (mut eng, outbox) = engine();
        let cfg = Config::default();
        let snap = snapshot(Some(95.0), None, None);
        let t0 = Instant::now();
        for i in 0..10u64 {
            eng.evaluate(&snap, &cfg, t0 + Duration::from_secs(3 * i));
        }
        assert_eq!(outbox.0.lock().unwrap().len(), 1);
        assert_eq!(eng.last_fired(AlertKind::Ram), Some(t0));
    }

    #[test]
    fn fires_again_only_after_cooldown_strictly_elapsed() {
        let (mut eng, outbox) = engine();
        let cfg = Config::default();
        let snap = snapshot(Some(95.0), None, None);
        let t0 = Instant::now();
        assert_eq!(eng.evaluate(&snap, &cfg, t0).len(), 1);
        assert!(eng.evaluate(&snap, &cfg, t0 + ALERT_COOLDOWN).is_empty());
        let later = t0 + ALERT_COOLDOWN + Duration::from_secs(1);
        assert_eq!(eng.evaluate(&snap, &cfg, later).len(), 1);
        assert_eq!(outbox.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn kinds_cool_down_independently() {
        let (mut eng, outbox) = engine();
        let cfg = Config::default();
        let t0 = Instant::now();

        let fired = eng.evaluate(&snapshot(Some(95.0), Some(80.0), None), &cfg, t0);
        let kinds: Vec<_> = fired.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Ram, AlertKind::Temp]);
        assert_eq!(outbox.0.lock().unwrap().len(), 2);

        // a disk alert a minute later is not held back by the others
        let t1 = t0 + Duration::from_secs(60);
        let fired = eng.evaluate(&snapshot(Some(95.0), Some(80.0), Some(Some(97.0))), &cfg, t1);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::Disk);
        assert_eq!(eng.last_fired(AlertKind::Ram), Some(t0));
        assert_eq!(eng.last_fired(AlertKind::Disk), Some(t1));
    }

    #[test]
    fn threshold_is_inclusive() {
        let (mut eng, _) = engine();
        let fired = eng.evaluate(&snapshot(Some(90.0), Some(74.9), None), &Config::default(), Instant::now());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, AlertKind::Ram);
    }

    #[test]
    fn disabled_or_unknown_uptime_skips_everything() {
        let (mut eng, outbox) = engine();
        let hot = snapshot(Some(99.0), Some(99.0), Some(Some(99.0)));
        let disabled = Config {
            alerts_enabled: false,
            ..Config::default()
        };
        assert!(eng.evaluate(&hot, &disabled, Instant::now()).is_empty());

        let no_uptime = Snapshot {
            uptime_sec: None,
            ..hot
        };
        assert!(eng.evaluate(&no_uptime, &Config::default(), Instant::now()).is_empty());
        assert!(outbox.0.lock().unwrap().is_empty());
        assert_eq!(eng.last_fired(AlertKind::Ram), None);
    }

    #[test]
    fn disk_without_percent_never_fires() {
        let (mut eng, _) = engine();
        let fired = eng.evaluate(&snapshot(None, None, Some(None)), &Config::default(), Instant::now());
        assert!(fired.is_empty());
    }

    #[test]
    fn message_carries_value_and_uptime_hours() {
        let msg = render_message(AlertKind::Ram, 92.0, 3600.0);
        assert!(msg.contains("STB RAM ALERT"));
        assert!(msg.contains("92.0%"));
        assert!(msg.contains("1.00 jam"));

        let msg = render_message(AlertKind::Temp, 81.25, 5400.0);
        assert!(msg.contains("81.2°C") || msg.contains("81.3°C"));
        assert!(msg.contains("1.50 jam"));

        let msg = render_message(AlertKind::Disk, 95.0, 0.0);
        assert!(msg.contains("STORAGE"));
        assert!(msg.contains("0.00 jam"));
    }

    #[test]
    fn shorter_cooldown_is_honoured() {
        let (eng, outbox) = engine();
        let mut eng = eng.with_cooldown(Duration::from_secs(5));
        let snap = snapshot(Some(95.0), None, None);
        let t0 = Instant::now();
        for i in 0..10u64 {
            eng.evaluate(&snap, &Config::default(), t0 + Duration::from_secs(3 * i));
        }
        // fires at 0, 6, 12, 18, 24
        assert_eq!(outbox.0.lock().unwrap().len(), 5);
    }
}
