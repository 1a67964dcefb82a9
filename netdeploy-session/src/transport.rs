//! The seam between the session manager and the network.
//!
//! [`SessionManager`](crate::SessionManager) only talks to a [`Connector`];
//! [`SshConnector`](crate::SshConnector) is the production implementation
//! and tests substitute their own.

use std::path::PathBuf;
use std::time::Duration;

use netdeploy_core::connection::Secret;

use crate::error::{ChannelError, ConnectError};
use crate::profile::DeviceProfile;

/// How to authenticate one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Private key file that exists on disk.
    KeyFile(PathBuf),
    Password(Secret),
}

/// Everything a connector needs to open one device session.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub device: String,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub auth: Auth,
    /// Bounds the TCP connect and every blocking read afterwards.
    pub timeout: Duration,
    pub profile: DeviceProfile,
}

/// Opens authenticated channels. One call is one connection attempt;
/// retries happen in the session manager.
pub trait Connector {
    fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Channel>, ConnectError>;
}

/// An open, authenticated command channel to one device.
pub trait Channel {
    /// Send one command and return the device's raw output.
    fn execute(&mut self, command: &str) -> Result<String, ChannelError>;

    fn close(&mut self) -> Result<(), ChannelError>;
}
