//! Runner configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file
//! - Environment variables (PARLEY_*, `__` separates sections)

use anyhow::{Context, Result};
use ::config::{Environment, File, FileFormat};
use parley_core::{
    BrokerConfig, DeliveryPolicy, DuplicatePolicy, HubConfig, MissingRecipientPolicy,
    SYSTEM_SENDER,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Broker policies.
    #[serde(default)]
    pub broker: BrokerSettings,

    /// Console output.
    #[serde(default)]
    pub output: OutputSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Broker policies applied to every room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Maximum members per room.
    #[serde(default = "default_max_members")]
    pub max_members: usize,

    /// Maximum number of rooms.
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,

    /// Duplicate-join handling.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Missing-recipient handling.
    #[serde(default)]
    pub missing_recipient: MissingRecipientPolicy,

    /// Delivery failure handling.
    #[serde(default)]
    pub delivery: DeliveryPolicy,

    /// Sender tag of join notices.
    #[serde(default = "default_system_sender")]
    pub system_sender: String,

    /// Room used by steps that name none.
    #[serde(default = "default_room")]
    pub default_room: String,
}

/// Console output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Print each received message as it arrives.
    #[serde(default = "default_true")]
    pub echo: bool,

    /// Print logs as JSON at the end of the run.
    #[serde(default)]
    pub transcript: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Install the in-process Prometheus recorder and print it at exit.
    #[serde(default)]
    pub enabled: bool,
}

// Default value functions
fn default_max_members() -> usize {
    10_000
}

fn default_max_rooms() -> usize {
    1_000
}

fn default_system_sender() -> String {
    SYSTEM_SENDER.to_string()
}

fn default_room() -> String {
    "lobby".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_members: default_max_members(),
            max_rooms: default_max_rooms(),
            duplicate_policy: DuplicatePolicy::default(),
            missing_recipient: MissingRecipientPolicy::default(),
            delivery: DeliveryPolicy::default(),
            system_sender: default_system_sender(),
            default_room: default_room(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            echo: true,
            transcript: false,
        }
    }
}

impl BrokerSettings {
    /// Per-room broker configuration.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            max_members: self.max_members,
            duplicate_policy: self.duplicate_policy,
            missing_recipient: self.missing_recipient,
            delivery: self.delivery,
            system_sender: self.system_sender.clone(),
        }
    }

    /// Hub configuration with rooms created on demand.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_rooms: self.max_rooms,
            auto_create_rooms: true,
            broker: self.broker_config(),
        }
    }
}

impl Settings {
    /// Load configuration from `path`, or the first default path that
    /// exists, then apply `PARLEY_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        Self::layered(file.as_deref(), env_source())
    }

    /// First existing default config path.
    fn default_path() -> Option<PathBuf> {
        let config_paths = ["parley.toml", "~/.config/parley/parley.toml"];

        config_paths
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    fn layered(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            tracing::debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let layers = builder
            .add_source(env)
            .build()
            .with_context(|| match file {
                Some(path) => format!("Failed to read config file: {}", path.display()),
                None => "Failed to read environment overrides".to_string(),
            })?;

        layers
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("PARLEY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
