//! Server-rendered dashboard. The first paint comes from the cached snapshot;
//! after that the page follows `/api/stream`, polling `/api/stats` while the
//! stream is down.

use std::fmt::Write;

use time::{macros::format_description, OffsetDateTime};

use crate::config::Config;
use crate::types::Snapshot;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn or_na(v: Option<String>) -> String {
    v.unwrap_or_else(|| "N/A".to_string())
}

fn pct(v: Option<f64>) -> String {
    or_na(v.map(|p| format!("{p:.1}%")))
}

fn clock(ts_ms: i64) -> String {
    let fmt = format_description!("[hour]:[minute]:[second] UTC");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts_ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(fmt).ok())
        .unwrap_or_else(|| "–".to_string())
}

fn card(out: &mut String, title: &str, id: &str, value: &str, detail: &str) {
    let _ = write!(
        out,
        r#"<div class="card"><h2>{title}</h2><div class="value" id="{id}">{value}</div><div class="muted" id="{id}-detail">{detail}</div><div class="bar"><div class="bar-fill" id="{id}-bar"></div></div></div>"#
    );
}

pub fn render_dashboard(snapshot: &Snapshot, config: &Config, hostname: &str) -> String {
    let host = escape(hostname);
    let ram_detail = or_na(snapshot.ram.as_ref().map(|r| format!("{:.2} / {:.2} GB", r.used_gb, r.total_gb)));
    let disk_detail = or_na(snapshot.disk.as_ref().map(|d| format!("{:.2} / {:.2} GB", d.used_gb, d.total_gb)));
    let temp = or_na(snapshot.temp_c.map(|t| format!("{t:.1}°C")));
    let uptime = or_na(snapshot.uptime_sec.map(|u| format!("{:.2} jam", u / 3600.0)));
    let alerts = if config.alerts_enabled { "ON" } else { "OFF" };

    let mut cards = String::new();
    card(&mut cards, "⚙️ CPU", "cpu", &pct(snapshot.cpu_percent), &format!("Temperatur: {temp}"));
    card(&mut cards, "🧠 Memory", "ram", &pct(snapshot.ram.as_ref().map(|r| r.percent)), &ram_detail);
    card(
        &mut cards,
        "💾 Storage",
        "disk",
        &pct(snapshot.disk.as_ref().and_then(|d| d.percent)),
        &disk_detail,
    );

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{host} · STB Monitor</title>
<style>
:root {{ --bg:#050917; --card:rgba(17,24,39,.6); --border:#1f2937; --text:#e5e7eb; --muted:#9ca3af; }}
body {{ margin:0; padding:32px; background:var(--bg); color:var(--text); font-family:"Segoe UI","Helvetica Neue",sans-serif; }}
header {{ display:flex; flex-wrap:wrap; justify-content:space-between; align-items:center; gap:12px; margin-bottom:16px; }}
h1 {{ margin:0; font-size:24px; }}
.pill {{ padding:6px 12px; border-radius:999px; border:1px solid rgba(56,189,248,.35); background:rgba(56,189,248,.15); font-size:13px; }}
.grid {{ display:grid; grid-template-columns:repeat(auto-fit,minmax(240px,1fr)); gap:12px; }}
.card {{ background:var(--card); border:1px solid var(--border); border-radius:14px; padding:16px; }}
.card h2 {{ margin:0 0 10px; font-size:17px; }}
.value {{ font-size:22px; font-weight:700; }}
.muted {{ color:var(--muted); font-size:13px; }}
.bar {{ height:12px; margin-top:8px; border:1px solid var(--border); border-radius:10px; background:#0b1224; overflow:hidden; }}
.bar-fill {{ height:100%; width:0%; background:linear-gradient(90deg,#38bdf8,#34d399); transition:width 160ms ease; }}
.bar-fill.danger {{ background:linear-gradient(90deg,#f43f5e,#f59e0b); }}
button {{ margin-top:8px; padding:6px 12px; border-radius:6px; border:1px solid #374151; background:#111827; color:var(--text); cursor:pointer; }}
</style>
</head>
<body>
<header>
  <div><h1>📊 {host}</h1><div class="muted">Realtime stats &amp; alerts · updated <span id="updated">{updated}</span></div></div>
  <div class="pill" id="uptime">Uptime: {uptime}</div>
</header>
<div class="grid">
{cards}
<div class="card"><h2>🔔 Alerts</h2>
  <div class="value" id="alerts">{alerts}</div>
  <div class="muted" id="thresholds">RAM ≥ {ram_th:.0}% · Temp ≥ {temp_th:.0}°C · Storage ≥ {disk_th:.0}%</div>
  <button id="toggle">Toggle</button>
</div>
</div>
<script>
const initial = {initial_json};
const fmtPct = v => v == null ? "N/A" : v.toFixed(1) + "%";
const gb = o => o ? o.usedGb.toFixed(2) + " / " + o.totalGb.toFixed(2) + " GB" : "N/A";
function bar(id, v, limit) {{
  const el = document.getElementById(id + "-bar");
  el.style.width = Math.max(0, Math.min(100, v || 0)) + "%";
  el.classList.toggle("danger", v != null && limit != null && v >= limit);
}}
function render(s) {{
  document.getElementById("cpu").textContent = fmtPct(s.cpuPercent);
  document.getElementById("cpu-detail").textContent = "Temperatur: " + (s.tempC == null ? "N/A" : s.tempC.toFixed(1) + "°C");
  document.getElementById("ram").textContent = fmtPct(s.ram && s.ram.percent);
  document.getElementById("ram-detail").textContent = gb(s.ram);
  document.getElementById("disk").textContent = fmtPct(s.disk && s.disk.percent);
  document.getElementById("disk-detail").textContent = gb(s.disk);
  document.getElementById("uptime").textContent = "Uptime: " + (s.uptimeSec == null ? "N/A" : (s.uptimeSec / 3600).toFixed(2) + " jam");
  document.getElementById("alerts").textContent = s.alertsEnabled ? "ON" : "OFF";
  document.getElementById("updated").textContent = new Date(s.timestampMs).toLocaleTimeString();
  bar("cpu", s.cpuPercent, null);
  bar("ram", s.ram && s.ram.percent, s.thresholds.ram);
  bar("disk", s.disk && s.disk.percent, s.thresholds.disk);
}}
render(initial);
const pollMs = {poll_ms};
let poller = null;
function startPolling() {{
  if (poller) return;
  poller = setInterval(async () => {{
    try {{
      const r = await fetch("/api/stats", {{ cache: "no-store" }});
      if (r.ok) render(await r.json());
    }} catch (_) {{}}
  }}, pollMs);
}}
function startStream() {{
  if (!window.EventSource) return startPolling();
  const es = new EventSource("/api/stream");
  es.onmessage = e => {{
    if (poller) {{ clearInterval(poller); poller = null; }}
    render(JSON.parse(e.data));
  }};
  es.onerror = () => startPolling();
}}
startStream();
document.getElementById("toggle").onclick = async () => {{
  const on = document.getElementById("alerts").textContent === "ON";
  const r = await fetch("/api/alerts?enabled=" + (on ? "0" : "1"), {{ method: "POST" }});
  if (r.ok) document.getElementById("alerts").textContent = (await r.json()).alerts_enabled ? "ON" : "OFF";
}};
</script>
</body>
</html>
"#,
        updated = clock(snapshot.timestamp_ms),
        poll_ms = config.poll_interval().as_millis(),
        ram_th = config.ram_threshold_pct,
        temp_th = config.temp_threshold_c,
        disk_th = config.disk_threshold_pct,
        // serde_json never emits "</", so the snapshot cannot close the script tag
        initial_json = serde_json::to_string(snapshot).unwrap_or_else(|_| "null".into()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RamInfo, Thresholds};

    fn snapshot() -> Snapshot {
        Snapshot {
            cpu_percent: None,
            ram: Some(RamInfo {
                total_gb: 2.0,
                used_gb: 1.84,
                percent: 92.0,
            }),
            disk: None,
            temp_c: Some(60.0),
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

    #[test]
    fn renders_values_and_placeholders() {
        let html = render_dashboard(&snapshot(), &Config::default(), "living-room");
        assert!(html.contains("living-room"));
        assert!(html.contains("92.0%"));
        assert!(html.contains("1.84 / 2.00 GB"));
        assert!(html.contains("60.0°C"));
        assert!(html.contains("1.00 jam"));
        assert!(html.contains("00:00:00 UTC"));
        // cpu and disk unknown
        assert!(html.contains(r#"id="cpu">N/A<"#));
        assert!(html.contains(r#"id="disk">N/A<"#));
        assert!(html.contains("EventSource(\"/api/stream\")"));
    }

    #[test]
    fn stream_errors_fall_back_to_polling_at_the_configured_interval() {
        let cfg = Config {
            poll_interval_sec: 5.0,
            ..Config::default()
        };
        let html = render_dashboard(&snapshot(), &cfg, "stb");
        assert!(html.contains("const pollMs = 5000;"));
        assert!(html.contains("es.onerror = () => startPolling();"));
        assert!(html.contains(r#"fetch("/api/stats""#));
    }

    #[test]
    fn hostname_is_escaped() {
        let html = render_dashboard(&snapshot(), &Config::default(), "<b>&x</b>");
        assert!(html.contains("&lt;b&gt;&amp;x&lt;/b&gt;"));
        assert!(!html.contains("<b>&x</b>"));
    }
}
