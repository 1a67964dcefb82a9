//! Session parameters and the override layers that produce them.
//!
//! A [`ConnectionConfig`] is never read from the environment. It is built at
//! session-open time by applying override layers, lowest precedence first:
//!
//! ```text
//! ConnectionConfig::default()
//!   ← inventory `defaults.connection`
//!   ← operator overrides (CLI flags / env, resolved by the binary)
//!   ← device `connection` + `credentials`
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A password that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Delay growth between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Credential block of a device (`credentials:` in the inventory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

/// One override layer. Every field is optional; `None` leaves the value
/// from the layer below untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConnectionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<Backoff>,
    /// Command sent after a configuration block has been applied
    /// (e.g. `save` on VRP).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_command: Option<String>,
}

impl ConnectionOverrides {
    /// Lay `creds` on top of this layer.
    pub fn with_credentials(mut self, creds: &Credentials) -> Self {
        if creds.username.is_some() {
            self.username = creds.username.clone();
        }
        if creds.password.is_some() {
            self.password = creds.password.clone();
        }
        if creds.key_file.is_some() {
            self.key_file = creds.key_file.clone();
        }
        self
    }
}

/// Fully resolved per-session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub username: String,
    /// Fallback when no usable key file is configured.
    pub password: Option<Secret>,
    pub key_file: Option<PathBuf>,
    pub device_type: String,
    pub port: u16,
    pub timeout: Duration,
    /// Total connection attempts (first try included). Treated as at least 1.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
    pub save_command: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: None,
            key_file: None,
            device_type: "huawei".to_string(),
            port: 22,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            backoff: Backoff::Fixed,
            save_command: None,
        }
    }
}

impl ConnectionConfig {
    /// Apply one override layer. `~/` in key file paths is expanded here.
    pub fn apply(mut self, layer: &ConnectionOverrides) -> Self {
        if let Some(username) = &layer.username {
            self.username = username.clone();
        }
        if let Some(password) = &layer.password {
            self.password = Some(password.clone());
        }
        if let Some(key_file) = &layer.key_file {
            self.key_file = Some(expand_home(key_file));
        }
        if let Some(device_type) = &layer.device_type {
            self.device_type = device_type.clone();
        }
        if let Some(port) = layer.port {
            self.port = port;
        }
        if let Some(secs) = layer.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(max_retries) = layer.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(secs) = layer.retry_delay_secs {
            self.retry_delay = Duration::from_secs(secs);
        }
        if let Some(backoff) = layer.backoff {
            self.backoff = backoff;
        }
        if let Some(cmd) = &layer.save_command {
            self.save_command = Some(cmd.clone());
        }
        self
    }
}

/// Expand a leading `~/` using the current user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
