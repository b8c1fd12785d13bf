//! stbmon_agent: sampling, live distribution, and threshold alerts for a single
//! set-top box. The binary in `main.rs` wires these modules to an axum server.

pub mod alerts;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod cpu;
pub mod dashboard;
pub mod http;
pub mod notify;
pub mod sampler;
pub mod sensors;
pub mod snapshot;
pub mod state;
pub mod types;
pub mod ws;
