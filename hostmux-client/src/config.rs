//! Client configuration loading
//!
//! Reads `config.toml` from the hostmux config directory. Every field has a
//! default, so a missing file or section is never an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hostmux_protocol::{MalformedLinePolicy, PacketOptions};
use hostmux_utils::{paths, HostmuxError, Result};
use serde::Deserialize;

use crate::backend::BackendConfig;
use crate::liveness::{LivenessConfig, ReportPolicy};

/// Full client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub packets: PacketConfig,
    pub requests: RequestConfig,
    pub liveness: LivenessSection,
}

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket URL of the host
    pub url: String,
    /// Connection attempts before giving up
    pub attempts: u32,
    /// Pause between attempts (milliseconds)
    pub retry_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9090".into(),
            attempts: 3,
            retry_delay_ms: 200,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Packet encoding and parsing
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PacketConfig {
    /// Gzip outbound packets
    pub gzip: bool,
    /// What the reader does with an unparsable line
    pub malformed_lines: MalformedLines,
}

/// Config-file form of `MalformedLinePolicy`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLines {
    #[default]
    Skip,
    Stall,
}

impl From<MalformedLines> for MalformedLinePolicy {
    fn from(value: MalformedLines) -> Self {
        match value {
            MalformedLines::Skip => MalformedLinePolicy::Skip,
            MalformedLines::Stall => MalformedLinePolicy::Stall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Wait for `run_process` and `ping` replies (milliseconds)
    pub timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LivenessSection {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub report: ReportPolicy,
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            timeout_ms: 10_000,
            report: ReportPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load from the default location
    ///
    /// Falls back to defaults (with a warning) when the file is unreadable or
    /// invalid.
    pub fn load() -> Self {
        let path = Self::default_path();

        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load from an explicit path, failing on any problem
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HostmuxError::ConfigNotFound(path.to_path_buf()),
            _ => HostmuxError::FileRead {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| HostmuxError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate(path)?;

        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: &str| HostmuxError::ConfigInvalid {
            path: path.to_path_buf(),
            message: message.into(),
        };
        if self.connection.url.is_empty() {
            return Err(invalid("connection.url must not be empty"));
        }
        if self.connection.attempts == 0 {
            return Err(invalid("connection.attempts must be at least 1"));
        }
        if self.requests.timeout_ms == 0 {
            return Err(invalid("requests.timeout_ms must be positive"));
        }
        if self.liveness.interval_ms == 0 || self.liveness.timeout_ms == 0 {
            return Err(invalid("liveness intervals must be positive"));
        }
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        paths::config_file()
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            packet_options: PacketOptions {
                gzip: self.packets.gzip,
            },
            request_timeout: Duration::from_millis(self.requests.timeout_ms),
            malformed_line_policy: self.packets.malformed_lines.into(),
        }
    }

    pub fn liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            interval: Duration::from_millis(self.liveness.interval_ms),
            timeout: Duration::from_millis(self.liveness.timeout_ms),
            policy: self.liveness.report,
        }
    }
}
