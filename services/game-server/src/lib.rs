//! Fishhunt game server: hosts room actors behind a WebSocket hub.

pub mod config;
pub mod hub;
pub mod store;
pub mod wallet;
pub mod ws;

pub use config::{Config, ConfigError, ValidatedConfig};
