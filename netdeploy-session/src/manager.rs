//! Per-device session lifecycle.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected --disconnect--> Disconnected
//!                               |                  |
//!                               +--exhausted--> Failed <--channel broke--+
//! ```
//!
//! `Failed` keeps the reason in [`SessionManager::last_error`]; a new
//! `connect` starts over from `Connecting`.

use std::collections::BTreeMap;
use std::time::Duration;

use netdeploy_core::ConnectionConfig;

use crate::error::{ConnectError, SessionError};
use crate::profile::DeviceProfile;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{Auth, Channel, ConnectRequest, Connector};

/// Where one device's session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

struct Session {
    state: SessionState,
    channel: Option<Box<dyn Channel>>,
    last_error: Option<String>,
    profile: DeviceProfile,
    save_command: Option<String>,
}

impl Session {
    fn new(profile: DeviceProfile) -> Self {
        Session {
            state: SessionState::Disconnected,
            channel: None,
            last_error: None,
            profile,
            save_command: None,
        }
    }

    fn fail(&mut self, reason: String) {
        self.state = SessionState::Failed;
        self.channel = None;
        self.last_error = Some(reason);
    }
}

/// Owns every device session of a run. Operations on one device are
/// expected to be issued one at a time, which `&mut self` enforces.
pub struct SessionManager<C: Connector> {
    connector: C,
    sessions: BTreeMap<String, Session>,
    sleep: fn(Duration),
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            sessions: BTreeMap::new(),
            sleep: std::thread::sleep,
        }
    }

    /// Replace the function used to wait between connection attempts.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a session to `device`. Returns `false` when every attempt
    /// failed; the reason is then in [`SessionManager::last_error`].
    pub fn connect(&mut self, device: &str, address: &str, config: &ConnectionConfig) -> bool {
        if self.state(device) == SessionState::Connected {
            return true;
        }

        let profile = DeviceProfile::for_device_type(&config.device_type);
        let mut session = Session::new(profile);
        session.state = SessionState::Connecting;
        session.save_command = config.save_command.clone();
        self.sessions.insert(device.to_string(), session);

        let auth = match select_auth(config) {
            Ok(auth) => auth,
            Err(err) => {
                tracing::warn!(device, error = %err, "cannot connect");
                self.record_failure(device, err.to_string());
                return false;
            }
        };
        let request = ConnectRequest {
            device: device.to_string(),
            address: address.to_string(),
            port: config.port,
            username: config.username.clone(),
            auth,
            timeout: config.timeout,
            profile,
        };

        let mut retry = RetryPolicy::from_config(config).start();
        loop {
            let attempt = retry.attempt();
            tracing::info!(
                device,
                address,
                attempt,
                max_attempts = retry.max_attempts(),
                "connecting"
            );
            match self.connector.open(&request) {
                Ok(channel) => {
                    retry.succeed();
                    if let Some(session) = self.sessions.get_mut(device) {
                        session.state = SessionState::Connected;
                        session.channel = Some(channel);
                    }
                    tracing::info!(device, attempt, "connected");
                    return true;
                }
                Err(err) => match retry.fail(err.is_retryable()) {
                    RetryDecision::Retry(delay) => {
                        tracing::warn!(
                            device,
                            attempt,
                            error = %err,
                            retry_in = ?delay,
                            "connection attempt failed"
                        );
                        (self.sleep)(delay);
                    }
                    RetryDecision::Exhausted => {
                        let reason = exhausted_reason(&err, attempt);
                        tracing::warn!(device, attempt, error = %err, "giving up on device");
                        self.record_failure(device, reason);
                        return false;
                    }
                },
            }
        }
    }

    /// Close the session to `device`. Unknown or already closed sessions
    /// count as closed. A close error still drops the session.
    pub fn disconnect(&mut self, device: &str) -> bool {
        let Some(session) = self.sessions.get_mut(device) else {
            return true;
        };
        let Some(mut channel) = session.channel.take() else {
            session.state = SessionState::Disconnected;
            return true;
        };
        session.state = SessionState::Disconnected;
        match channel.close() {
            Ok(()) => {
                tracing::info!(device, "disconnected");
                true
            }
            Err(err) => {
                tracing::warn!(device, error = %err, "error while closing session");
                session.last_error = Some(format!("close failed: {err}"));
                false
            }
        }
    }

    /// Close every open session. Returns `true` if all closed cleanly.
    pub fn disconnect_all(&mut self) -> bool {
        let open: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.channel.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        let mut clean = true;
        for device in open {
            clean &= self.disconnect(&device);
        }
        clean
    }

    /// Send one command and return the device's output.
    ///
    /// Output carrying one of the platform's error markers is
    /// [`SessionError::Rejected`]; the session stays usable. A channel
    /// failure is [`SessionError::Command`] and leaves the session `Failed`.
    pub fn send_command(&mut self, device: &str, command: &str) -> Result<String, SessionError> {
        let session = self.connected_mut(device)?;
        let Some(channel) = session.channel.as_mut() else {
            return Err(not_connected(device));
        };
        tracing::debug!(device, command, "sending");
        match channel.execute(command) {
            Ok(output) => {
                if let Some(line) = session.profile.rejection(&output) {
                    let line = line.to_string();
                    session.last_error = Some(format!("'{command}' rejected: {line}"));
                    return Err(SessionError::Rejected {
                        device: device.to_string(),
                        command: command.to_string(),
                        output: line,
                    });
                }
                Ok(output)
            }
            Err(source) => {
                session.fail(format!("'{command}' failed: {source}"));
                Err(SessionError::Command {
                    device: device.to_string(),
                    command: command.to_string(),
                    source,
                })
            }
        }
    }

    /// Apply a multi-line configuration block, one command per line.
    ///
    /// Blank lines and `#`/`!` comment lines are skipped. Returns `Ok(false)`
    /// for an empty block and at the first failing command (no rollback);
    /// the reason is in [`SessionManager::last_error`].
    pub fn deploy_config(&mut self, device: &str, config_text: &str) -> Result<bool, SessionError> {
        let session = self.connected_mut(device)?;
        let profile = session.profile;
        let save_command = session.save_command.clone();

        let commands = config_commands(config_text);
        if commands.is_empty() {
            tracing::warn!(device, "configuration is empty, nothing to apply");
            session.last_error = Some("configuration is empty".to_string());
            return Ok(false);
        }

        let mut sequence: Vec<&str> = Vec::with_capacity(commands.len() + 2);
        sequence.extend(profile.enter_config);
        sequence.extend(commands.iter().copied());
        if let Some(exit) = profile.exit_config {
            if commands.last() != Some(&exit) {
                sequence.push(exit);
            }
        }

        for command in sequence {
            if let Err(err) = self.send_command(device, command) {
                tracing::warn!(device, error = %err, "configuration aborted");
                return Ok(false);
            }
        }

        if let Some(save) = save_command.as_deref() {
            match self.send_command(device, save) {
                Ok(output) if profile.asks_confirmation(&output) => {
                    if let Err(err) = self.send_command(device, "y") {
                        tracing::warn!(device, error = %err, "save not confirmed");
                        return Ok(false);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(device, error = %err, "save failed");
                    return Ok(false);
                }
            }
        }

        tracing::info!(device, lines = commands.len(), "configuration applied");
        Ok(true)
    }

    /// Which known devices are connected right now. No I/O.
    pub fn connection_status(&self) -> BTreeMap<String, bool> {
        self.sessions
            .iter()
            .map(|(name, s)| (name.clone(), s.state == SessionState::Connected))
            .collect()
    }

    pub fn state(&self, device: &str) -> SessionState {
        self.sessions
            .get(device)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    pub fn last_error(&self, device: &str) -> Option<&str> {
        self.sessions.get(device)?.last_error.as_deref()
    }

    fn connected_mut(&mut self, device: &str) -> Result<&mut Session, SessionError> {
        match self.sessions.get_mut(device) {
            Some(session) if session.state == SessionState::Connected => Ok(session),
            _ => Err(not_connected(device)),
        }
    }

    fn record_failure(&mut self, device: &str, reason: String) {
        if let Some(session) = self.sessions.get_mut(device) {
            session.fail(reason);
        }
    }
}

fn not_connected(device: &str) -> SessionError {
    SessionError::NotConnected {
        device: device.to_string(),
    }
}

fn exhausted_reason(err: &ConnectError, attempts: u32) -> String {
    if err.is_retryable() {
        format!("{err} (after {attempts} attempt(s))")
    } else {
        err.to_string()
    }
}

/// Key file when configured and present, otherwise password.
pub fn select_auth(config: &ConnectionConfig) -> Result<Auth, ConnectError> {
    if let Some(key) = &config.key_file {
        if key.is_file() {
            return Ok(Auth::KeyFile(key.clone()));
        }
        tracing::debug!(key_file = %key.display(), "key file not found, trying password");
    }
    match &config.password {
        Some(password) => Ok(Auth::Password(password.clone())),
        None => Err(ConnectError::NoCredentials {
            reason: match &config.key_file {
                Some(key) => format!("key file {} does not exist and no password is set", key.display()),
                None => "neither a key file nor a password is configured".to_string(),
            },
        }),
    }
}

/// Command lines of a configuration block, trimmed, without blanks and
/// `#`/`!` comment lines.
pub fn config_commands(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .collect()
}
