use fishhunt_execution::{ModelConfig, RtpConfig};
use fishhunt_types::{Tier, TierCatalog, TierConfig, TierConfigError};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, net::SocketAddr, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;
use url::Url;

use crate::hub;

pub const ENV_LISTEN: &str = "FISHHUNT_LISTEN";
pub const ENV_LOG_LEVEL: &str = "FISHHUNT_LOG_LEVEL";
pub const ENV_REDIS_URL: &str = "FISHHUNT_REDIS_URL";
pub const ENV_WALLET_URL: &str = "FISHHUNT_WALLET_URL";

const MAX_GAME_LOOP_FPS: u32 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Wallet backend.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum WalletConfig {
    /// Process-local balances, opened lazily at `initial_balance`.
    Memory {
        #[serde(default = "default_initial_balance")]
        initial_balance: i64,
        #[serde(default = "default_wallet_timeout_ms")]
        timeout_ms: u64,
    },
    Http {
        base_url: String,
        #[serde(default = "default_wallet_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig::Memory {
            initial_balance: default_initial_balance(),
            timeout_ms: default_wallet_timeout_ms(),
        }
    }
}

impl WalletConfig {
    pub fn timeout_ms(&self) -> u64 {
        match self {
            WalletConfig::Memory { timeout_ms, .. } | WalletConfig::Http { timeout_ms, .. } => {
                *timeout_ms
            }
        }
    }
}

/// Inventory store backend.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Redis {
        url: String,
        #[serde(default = "default_redis_prefix")]
        prefix: String,
    },
}

/// Configuration file for the game server.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_message_queue_size")]
    pub message_queue_size: usize,
    #[serde(default = "default_broadcast_buffer")]
    pub broadcast_buffer: usize,
    /// Frames buffered per connection before the connection is dropped.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,
    #[serde(default = "default_bootstrap_rooms_per_tier")]
    pub bootstrap_rooms_per_tier: usize,
    #[serde(default = "default_room_mailbox_size")]
    pub room_mailbox_size: usize,
    #[serde(default = "default_game_loop_fps")]
    pub game_loop_fps: u32,
    /// Seconds an ephemeral room may stay empty before it closes.
    #[serde(default = "default_room_idle_timeout_secs")]
    pub room_idle_timeout_secs: u64,
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_min_join_balance")]
    pub min_join_balance: i64,

    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rtp: RtpConfig,
    #[serde(default)]
    pub math: ModelConfig,
    /// Per-tier replacements for the built-in table.
    #[serde(default)]
    pub tiers: BTreeMap<Tier, TierConfig>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_message_queue_size() -> usize {
    256
}

fn default_broadcast_buffer() -> usize {
    512
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_max_connections() -> usize {
    1_000
}

fn default_max_rooms() -> usize {
    100
}

fn default_bootstrap_rooms_per_tier() -> usize {
    1
}

fn default_room_mailbox_size() -> usize {
    256
}

fn default_game_loop_fps() -> u32 {
    10
}

fn default_room_idle_timeout_secs() -> u64 {
    300
}

fn default_snapshot_interval_ms() -> u64 {
    1_000
}

fn default_min_join_balance() -> i64 {
    100
}

fn default_ping_interval_secs() -> u64 {
    54
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_max_message_size() -> usize {
    512
}

fn default_stats_interval_secs() -> u64 {
    30
}

fn default_initial_balance() -> i64 {
    10_000
}

fn default_wallet_timeout_ms() -> u64 {
    2_000
}

fn default_redis_prefix() -> String {
    "fishhunt:".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            message_queue_size: default_message_queue_size(),
            broadcast_buffer: default_broadcast_buffer(),
            outbound_buffer: default_outbound_buffer(),
            max_connections: default_max_connections(),
            max_rooms: default_max_rooms(),
            bootstrap_rooms_per_tier: default_bootstrap_rooms_per_tier(),
            room_mailbox_size: default_room_mailbox_size(),
            game_loop_fps: default_game_loop_fps(),
            room_idle_timeout_secs: default_room_idle_timeout_secs(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            min_join_balance: default_min_join_balance(),
            ping_interval_secs: default_ping_interval_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            max_message_size: default_max_message_size(),
            stats_interval_secs: default_stats_interval_secs(),
            wallet: WalletConfig::default(),
            store: StoreConfig::default(),
            rtp: RtpConfig::default(),
            math: ModelConfig::default(),
            tiers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid listen address: {value}")]
    InvalidListen { value: String },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: usize },
    #[error("{field} must be {expected} (got {value})")]
    InvalidRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be {expected}: {value}")]
    InvalidUrlScheme {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("invalid tier config: {0}")]
    InvalidTier(#[from] TierConfigError),
}

/// Socket-level limits applied to every client connection.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub max_connections: usize,
    pub outbound_buffer: usize,
    pub max_message_size: usize,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

pub struct ValidatedConfig {
    pub listen: SocketAddr,
    pub log_level: Level,
    pub log_format: LogFormat,
    pub hub: hub::Config,
    pub transport: TransportConfig,
    pub wallet: WalletConfig,
    pub store: StoreConfig,
    pub rtp: RtpConfig,
    pub math: ModelConfig,
}

fn ensure_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn ensure_nonzero_u64(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value: 0 });
    }
    Ok(())
}

fn ensure_range(
    field: &'static str,
    value: f64,
    valid: bool,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if !valid {
        return Err(ConfigError::InvalidRange {
            field,
            value: value.to_string(),
            expected,
        });
    }
    Ok(())
}

fn validate_url(
    field: &'static str,
    value: &str,
    schemes: &[&str],
    expected: &'static str,
) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrlScheme {
            field,
            value: value.to_string(),
            expected,
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl Config {
    /// Apply `FISHHUNT_*` overrides read through `lookup`.
    ///
    /// A Redis or wallet URL switches the corresponding backend, keeping any prefix or timeout
    /// already configured.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(listen) = lookup(ENV_LISTEN) {
            self.listen = listen;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = lookup(ENV_REDIS_URL) {
            let prefix = match &self.store {
                StoreConfig::Redis { prefix, .. } => prefix.clone(),
                StoreConfig::Memory => default_redis_prefix(),
            };
            self.store = StoreConfig::Redis { url, prefix };
        }
        if let Some(base_url) = lookup(ENV_WALLET_URL) {
            self.wallet = WalletConfig::Http {
                base_url,
                timeout_ms: self.wallet.timeout_ms(),
            };
        }
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let listen = SocketAddr::from_str(&self.listen).map_err(|_| ConfigError::InvalidListen {
            value: self.listen.clone(),
        })?;
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        ensure_nonzero("message_queue_size", self.message_queue_size)?;
        ensure_nonzero("broadcast_buffer", self.broadcast_buffer)?;
        ensure_nonzero("outbound_buffer", self.outbound_buffer)?;
        ensure_nonzero("max_connections", self.max_connections)?;
        ensure_nonzero("max_rooms", self.max_rooms)?;
        ensure_nonzero("room_mailbox_size", self.room_mailbox_size)?;
        ensure_nonzero("max_message_size", self.max_message_size)?;
        ensure_nonzero_u64("room_idle_timeout_secs", self.room_idle_timeout_secs)?;
        ensure_nonzero_u64("snapshot_interval_ms", self.snapshot_interval_ms)?;
        ensure_nonzero_u64("ping_interval_secs", self.ping_interval_secs)?;
        ensure_nonzero_u64("write_timeout_secs", self.write_timeout_secs)?;
        ensure_nonzero_u64("stats_interval_secs", self.stats_interval_secs)?;
        ensure_nonzero_u64("wallet.timeout_ms", self.wallet.timeout_ms())?;

        ensure_range(
            "game_loop_fps",
            self.game_loop_fps as f64,
            (1..=MAX_GAME_LOOP_FPS).contains(&self.game_loop_fps),
            "between 1 and 60",
        )?;
        ensure_range(
            "bootstrap_rooms_per_tier",
            self.bootstrap_rooms_per_tier as f64,
            self.bootstrap_rooms_per_tier * Tier::ALL.len() <= self.max_rooms,
            "at most max_rooms / 4",
        )?;
        ensure_range(
            "min_join_balance",
            self.min_join_balance as f64,
            self.min_join_balance >= 0,
            ">= 0",
        )?;
        ensure_range(
            "rtp.cold_start_threshold",
            self.rtp.cold_start_threshold as f64,
            self.rtp.cold_start_threshold >= 0,
            ">= 0",
        )?;
        ensure_range(
            "rtp.tolerance",
            self.rtp.tolerance,
            (0.0..=1.0).contains(&self.rtp.tolerance),
            "in [0, 1]",
        )?;
        ensure_range(
            "math.critical_rate",
            self.math.critical_rate,
            (0.0..=1.0).contains(&self.math.critical_rate),
            "in [0, 1]",
        )?;
        ensure_range(
            "math.critical_multiplier",
            self.math.critical_multiplier,
            self.math.critical_multiplier >= 1.0,
            ">= 1",
        )?;
        ensure_range(
            "math.max_payout_multiplier",
            self.math.max_payout_multiplier,
            self.math.max_payout_multiplier >= 1.0,
            ">= 1",
        )?;

        if let WalletConfig::Http { base_url, .. } = &self.wallet {
            validate_url("wallet.base_url", base_url, &["http", "https"], "http or https")?;
        }
        if let StoreConfig::Redis { url, .. } = &self.store {
            validate_url("store.url", url, &["redis", "rediss"], "redis or rediss")?;
        }

        let catalog = TierCatalog::with_overrides(self.tiers);
        catalog.validate()?;

        let hub = hub::Config {
            message_queue_size: self.message_queue_size,
            broadcast_buffer: self.broadcast_buffer,
            max_rooms: self.max_rooms,
            bootstrap_rooms_per_tier: self.bootstrap_rooms_per_tier,
            room_mailbox_size: self.room_mailbox_size,
            tick_interval: Duration::from_secs_f64(1.0 / self.game_loop_fps as f64),
            snapshot_interval: Duration::from_millis(self.snapshot_interval_ms),
            room_idle_timeout: Duration::from_secs(self.room_idle_timeout_secs),
            min_join_balance: self.min_join_balance,
            stats_interval: Duration::from_secs(self.stats_interval_secs),
            catalog,
        };
        let transport = TransportConfig {
            max_connections: self.max_connections,
            outbound_buffer: self.outbound_buffer,
            max_message_size: self.max_message_size,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        };

        Ok(ValidatedConfig {
            listen,
            log_level,
            log_format: self.log_format,
            hub,
            transport,
            wallet: self.wallet,
            store: self.store,
            rtp: self.rtp,
            math: self.math,
        })
    }
}
