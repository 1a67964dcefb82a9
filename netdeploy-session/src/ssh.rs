//! [`Connector`] over SSH, using the `ssh2` crate (libssh2).
//!
//! Each session gets one interactive shell on a PTY rather than one exec
//! channel per command. Network CLIs keep mode state (`system-view`,
//! `configure terminal`) across commands, which exec channels would lose.
//! Output of a command is everything up to the next prompt.
//!
//! Everything here blocks; timeouts come from [`ConnectRequest::timeout`].
//! It bounds each socket operation and also the wait for a prompt, so a
//! device that keeps printing without one still fails.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::{ChannelError, ConnectError};
use crate::profile::DeviceProfile;
use crate::transport::{Auth, Channel, ConnectRequest, Connector};

/// libssh2's `LIBSSH2_ERROR_TIMEOUT`.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// PTY width; wide enough that devices do not wrap long config lines.
const PTY_COLUMNS: u32 = 512;

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// Production [`Connector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        SshConnector
    }
}

impl Connector for SshConnector {
    fn open(&self, request: &ConnectRequest) -> Result<Box<dyn Channel>, ConnectError> {
        let session = open_session(request)?;
        let shell = SshShell::start(session, request)?;
        Ok(Box::new(shell))
    }
}

// ---------------------------------------------------------------------------
// Connection + authentication
// ---------------------------------------------------------------------------

fn endpoint(request: &ConnectRequest) -> String {
    format!("{}:{}", request.address, request.port)
}

fn is_timeout(err: &ssh2::Error) -> bool {
    matches!(err.code(), ssh2::ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT))
}

fn ssh_failure(request: &ConnectRequest, stage: &str, err: ssh2::Error) -> ConnectError {
    if is_timeout(&err) {
        ConnectError::Timeout {
            address: endpoint(request),
            timeout: request.timeout,
        }
    } else {
        ConnectError::Transport {
            address: endpoint(request),
            message: format!("{stage}: {err}"),
        }
    }
}

fn io_failure(request: &ConnectRequest, err: std::io::Error) -> ConnectError {
    let address = endpoint(request);
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => ConnectError::Timeout {
            address,
            timeout: request.timeout,
        },
        ErrorKind::ConnectionRefused => ConnectError::Refused { address },
        _ => ConnectError::Transport {
            address,
            message: err.to_string(),
        },
    }
}

fn tcp_connect(request: &ConnectRequest) -> Result<TcpStream, ConnectError> {
    let addrs = (request.address.as_str(), request.port)
        .to_socket_addrs()
        .map_err(|e| ConnectError::Transport {
            address: endpoint(request),
            message: format!("cannot resolve address: {e}"),
        })?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, request.timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => io_failure(request, e),
        None => ConnectError::Transport {
            address: endpoint(request),
            message: "address resolved to nothing".to_string(),
        },
    })
}

fn open_session(request: &ConnectRequest) -> Result<ssh2::Session, ConnectError> {
    let tcp = tcp_connect(request)?;
    tcp.set_read_timeout(Some(request.timeout)).ok();
    tcp.set_write_timeout(Some(request.timeout)).ok();

    let mut session = ssh2::Session::new().map_err(|e| ssh_failure(request, "session", e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_ms(request.timeout));
    session
        .handshake()
        .map_err(|e| ssh_failure(request, "handshake", e))?;

    let user = request.username.as_str();
    let outcome = match &request.auth {
        Auth::KeyFile(path) => session.userauth_pubkey_file(user, None, path, None),
        Auth::Password(secret) => match session.userauth_password(user, secret.expose()) {
            // Some platforms only offer keyboard-interactive.
            Err(e) if !is_timeout(&e) => {
                let mut prompter = PasswordPrompt {
                    password: secret.expose().to_string(),
                };
                session.userauth_keyboard_interactive(user, &mut prompter)
            }
            other => other,
        },
    };
    if let Err(e) = &outcome {
        if is_timeout(e) {
            return Err(ConnectError::Timeout {
                address: endpoint(request),
                timeout: request.timeout,
            });
        }
    }
    if !session.authenticated() {
        return Err(ConnectError::AuthRejected {
            username: request.username.clone(),
            address: endpoint(request),
        });
    }
    Ok(session)
}

fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Interactive shell
// ---------------------------------------------------------------------------

struct SshShell {
    session: ssh2::Session,
    channel: ssh2::Channel,
    profile: DeviceProfile,
    timeout: Duration,
}

impl SshShell {
    fn start(session: ssh2::Session, request: &ConnectRequest) -> Result<Self, ConnectError> {
        let mut channel = session
            .channel_session()
            .map_err(|e| ssh_failure(request, "open channel", e))?;
        channel
            .request_pty("vt100", None, Some((PTY_COLUMNS, 24, 0, 0)))
            .map_err(|e| ssh_failure(request, "request pty", e))?;
        channel
            .shell()
            .map_err(|e| ssh_failure(request, "start shell", e))?;

        let mut shell = SshShell {
            session,
            channel,
            profile: request.profile,
            timeout: request.timeout,
        };
        let shell_failure = |e: ChannelError| ConnectError::Transport {
            address: endpoint(request),
            message: format!("waiting for prompt: {e}"),
        };
        shell.read_until_prompt().map_err(shell_failure)?;
        if let Some(command) = request.profile.disable_paging {
            shell.execute(command).map_err(shell_failure)?;
        }
        Ok(shell)
    }

    fn read_until_prompt(&mut self) -> Result<String, ChannelError> {
        read_to_prompt(&mut self.channel, &self.profile, self.timeout)
    }
}

/// Everything `reader` produces up to and including the next prompt.
fn read_to_prompt<R: Read>(
    reader: &mut R,
    profile: &DeviceProfile,
    timeout: Duration,
) -> Result<String, ChannelError> {
    let deadline = Instant::now() + timeout;
    let mut raw = Vec::new();
    let mut line_start = 0;
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Err(ChannelError::Closed);
        }
        if let Some(i) = buf[..n].iter().rposition(|b| *b == b'\n') {
            line_start = raw.len() + i + 1;
        }
        raw.extend_from_slice(&buf[..n]);
        if at_prompt(&String::from_utf8_lossy(&raw[line_start..]), profile) {
            return Ok(String::from_utf8_lossy(&raw).into_owned());
        }
        if Instant::now() >= deadline {
            return Err(ChannelError::Timeout(timeout));
        }
    }
}

impl Channel for SshShell {
    fn execute(&mut self, command: &str) -> Result<String, ChannelError> {
        self.channel.write_all(command.as_bytes())?;
        self.channel.write_all(b"\n")?;
        self.channel.flush()?;
        let raw = self.read_until_prompt()?;
        Ok(clean_output(command, &raw))
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        let ssh = |e: ssh2::Error| ChannelError::Transport(e.to_string());
        self.channel.send_eof().map_err(ssh)?;
        self.channel.close().map_err(ssh)?;
        self.channel.wait_close().map_err(ssh)?;
        self.session
            .disconnect(None, "session closed", None)
            .map_err(ssh)
    }
}

/// `<HOST>`, `[HOST]`, `[~HOST-vlan10]`, `host#`, `host(config)#`, `host>`.
fn is_prompt(line: &str) -> bool {
    let line = line.trim();
    if line.len() < 2 || line.contains(char::is_whitespace) {
        return false;
    }
    (line.starts_with('<') && line.ends_with('>'))
        || (line.starts_with('[') && line.ends_with(']'))
        || line.ends_with('#')
        || line.ends_with('>')
}

fn at_prompt(text: &str, profile: &DeviceProfile) -> bool {
    let last = text.rsplit('\n').next().unwrap_or_default();
    let last = last.trim_end_matches('\r').trim_end();
    is_prompt(last) || last.ends_with(profile.confirm_prompt)
}

/// Drop carriage returns, the echoed command and the trailing prompt.
fn clean_output(command: &str, raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().map(|l| l.trim_end_matches('\r')).collect();
    if lines.first().map_or(false, |l| l.trim_end().ends_with(command.trim())) {
        lines.remove(0);
    }
    if lines.last().map_or(false, |l| is_prompt(l)) {
        lines.pop();
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::HUAWEI;

    #[test]
    fn prompts_are_recognised() {
        for prompt in ["<CORE-SW-01>", "[CORE-SW-01]", "[~CORE-SW-01-Vlanif10]", "rtr1#", "rtr1(config)#", "rtr1>"] {
            assert!(is_prompt(prompt), "{prompt}");
        }
        for line in ["#", "", " ip address 10.0.0.1 255.255.255.0", "Info: done."] {
            assert!(!is_prompt(line), "{line:?}");
        }
    }

    /// Prints a status line every millisecond and never a prompt.
    struct Chatter;

    impl Read for Chatter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_millis(1));
            let line = b"Info: operation in progress...\r\n";
            let n = line.len().min(buf.len());
            buf[..n].copy_from_slice(&line[..n]);
            Ok(n)
        }
    }

    #[test]
    fn output_without_prompt_times_out() {
        let started = Instant::now();
        let err = read_to_prompt(&mut Chatter, &HUAWEI, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(t) if t == Duration::from_millis(50)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn read_stops_at_prompt() {
        let mut input: &[u8] = b"display clock\r\n2026-10-16 10:00:00\r\n<SW1>";
        let out = read_to_prompt(&mut input, &HUAWEI, Duration::from_secs(5)).unwrap();
        assert!(out.ends_with("<SW1>"), "{out:?}");
    }

    #[test]
    fn eof_before_prompt_is_closed() {
        let mut input: &[u8] = b"display clock\r\n";
        let err = read_to_prompt(&mut input, &HUAWEI, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ChannelError::Closed), "{err:?}");
    }

    #[test]
    fn confirmation_counts_as_prompt() {
        assert!(at_prompt("save\r\nAre you sure to continue? [Y/N]:", &HUAWEI));
        assert!(at_prompt("vlan 20\r\n[CORE-SW-01-vlan20]", &HUAWEI));
        assert!(!at_prompt("display version\r\nHuawei Versatile Routing Platform", &HUAWEI));
    }

    #[test]
    fn output_is_cleaned() {
        let raw = "display clock\r\n2024-01-01 10:00:00\r\nMonday\r\n<CORE-SW-01>";
        assert_eq!(clean_output("display clock", raw), "2024-01-01 10:00:00\nMonday");
        assert_eq!(clean_output("sysname X", "sysname X\r\n[X]"), "");
    }

    #[test]
    fn timeout_conversion_saturates() {
        assert_eq!(timeout_ms(Duration::from_secs(30)), 30_000);
        assert_eq!(timeout_ms(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[test]
    fn unreachable_port_is_a_retryable_error() {
        // Port 1 on localhost is closed in any sane test environment.
        let request = ConnectRequest {
            device: "lab".into(),
            address: "127.0.0.1".into(),
            port: 1,
            username: "admin".into(),
            auth: Auth::Password(netdeploy_core::connection::Secret::new("x")),
            timeout: Duration::from_secs(2),
            profile: HUAWEI,
        };
        let err = SshConnector::new().open(&request).err().expect("must fail");
        assert!(err.is_retryable(), "got {err}");
    }
}
