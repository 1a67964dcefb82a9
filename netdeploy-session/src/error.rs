//! Error types for netdeploy-session.

use std::time::Duration;

use thiserror::Error;

/// Failure to open an authenticated channel.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection to {address} timed out after {}s", .timeout.as_secs())]
    Timeout { address: String, timeout: Duration },

    #[error("connection to {address} refused")]
    Refused { address: String },

    /// Handshake, DNS or socket failure that may clear up on its own.
    #[error("transport error talking to {address}: {message}")]
    Transport { address: String, message: String },

    /// The device said no to these credentials.
    #[error("authentication rejected for user '{username}' on {address}")]
    AuthRejected { username: String, address: String },

    #[error("no usable credentials: {reason}")]
    NoCredentials { reason: String },
}

impl ConnectError {
    /// Whether another attempt could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::Timeout { .. } | ConnectError::Refused { .. } | ConnectError::Transport { .. }
        )
    }
}

/// Failure on an open channel. Every variant means the channel is unusable.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed by remote end")]
    Closed,

    #[error("channel i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ssh error: {0}")]
    Transport(String),

    #[error("no prompt within {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

/// Errors returned by [`crate::SessionManager`] command operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device '{device}' is not connected")]
    NotConnected { device: String },

    /// The device answered with one of its error markers.
    #[error("{device} rejected '{command}': {output}")]
    Rejected {
        device: String,
        command: String,
        output: String,
    },

    /// The channel broke while sending the command.
    #[error("command '{command}' failed on {device}: {source}")]
    Command {
        device: String,
        command: String,
        #[source]
        source: ChannelError,
    },
}
