//! netdeploy session library: authenticated device sessions with bounded retry.
//!
//! - [`manager`]: [`SessionManager`], the per-device state machine
//! - [`retry`]: [`RetryPolicy`] / [`RetryState`], pure retry bookkeeping
//! - [`transport`]: the [`Connector`] / [`Channel`] seam
//! - [`ssh`]: [`SshConnector`], the production transport
//! - [`profile`]: per-platform config-mode commands and error markers

pub mod error;
pub mod manager;
pub mod profile;
pub mod retry;
pub mod ssh;
pub mod transport;

pub use error::{ChannelError, ConnectError, SessionError};
pub use manager::{config_commands, select_auth, SessionManager, SessionState};
pub use profile::DeviceProfile;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use ssh::SshConnector;
pub use transport::{Auth, Channel, ConnectRequest, Connector};
