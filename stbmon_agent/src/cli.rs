//! Hand-rolled argument parsing for the agent binary.

use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;

pub const USAGE: &str = "\
Usage: stbmon_agent [--port PORT] [--config PATH]

Options:
  -p, --port PORT      listen port (default 8000, env STBMON_PORT)
  -c, --config PATH    config file to load and save (env STBMON_CONFIG)
  -h, --help           print this help

Environment:
  RUST_LOG                  log filter (default stbmon_agent=info)
  STBMON_TELEGRAM_TOKEN     bot token for alert delivery
  STBMON_TELEGRAM_CHAT_ID   chat that receives alerts
  STBMON_TEMP=0             skip temperature probes
  STBMON_DF_TIMEOUT_MS      per-mount df timeout (default 5000)";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("{usage}", usage = USAGE)]
    Help,
    #[error("{0}\n\n{usage}", usage = USAGE)]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArgs {
    pub port: u16,
    pub config: Option<PathBuf>,
}

/// Port used when no flag is given: STBMON_PORT if it parses, else 8000.
pub fn default_port() -> u16 {
    std::env::var("STBMON_PORT")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Parse `std::env::args()`-shaped input (program name first).
pub fn parse_args<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> Result<ParsedArgs, ArgsError> {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut port: Option<String> = None;
    let mut config: Option<PathBuf> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "-h" | "--help" => return Err(ArgsError::Help),
            "--port" | "-p" => {
                port = Some(it.next().ok_or_else(|| ArgsError::Invalid(format!("{a} needs a value")))?);
            }
            "--config" | "-c" => {
                let v = it.next().ok_or_else(|| ArgsError::Invalid(format!("{a} needs a value")))?;
                config = Some(PathBuf::from(v));
            }
            _ if a.starts_with("--port=") => port = a.split_once('=').map(|(_, v)| v.to_string()),
            _ if a.starts_with("--config=") => {
                config = a.split_once('=').map(|(_, v)| PathBuf::from(v));
            }
            _ => return Err(ArgsError::Invalid(format!("unknown argument: {a}"))),
        }
    }
    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| ArgsError::Invalid(format!("invalid port: {p}")))?,
        None => default_port,
    };
    Ok(ParsedArgs { port, config })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("stbmon_agent")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn port_long_short_and_assign() {
        assert_eq!(parse_args(args(&["--port", "9001"]), 8000).unwrap().port, 9001);
        assert_eq!(parse_args(args(&["-p", "9002"]), 8000).unwrap().port, 9002);
        assert_eq!(parse_args(args(&["--port=9003"]), 8000).unwrap().port, 9003);
        assert_eq!(parse_args(args(&[]), 8123).unwrap().port, 8123);
    }

    #[test]
    fn config_path_forms() {
        let p = parse_args(args(&["-c", "/tmp/a.json", "-p", "1"]), 8000).unwrap();
        assert_eq!(p.config, Some(PathBuf::from("/tmp/a.json")));
        let p = parse_args(args(&["--config=/etc/stb.json"]), 8000).unwrap();
        assert_eq!(p.config, Some(PathBuf::from("/etc/stb.json")));
        assert_eq!(parse_args(args(&[]), 8000).unwrap().config, None);
    }

    #[test]
    fn help_and_errors() {
        assert_eq!(parse_args(args(&["-h"]), 8000).unwrap_err(), ArgsError::Help);
        assert_eq!(ArgsError::Help.to_string(), USAGE);
        let bad = parse_args(args(&["--port", "nope"]), 8000).unwrap_err();
        assert_eq!(bad, ArgsError::Invalid("invalid port: nope".into()));
        assert!(bad.to_string().ends_with(USAGE));
        assert!(matches!(parse_args(args(&["--port"]), 8000), Err(ArgsError::Invalid(_))));
        assert!(parse_args(args(&["--bogus"]), 8000)
            .unwrap_err()
            .to_string()
            .contains("unknown argument"));
    }
}
