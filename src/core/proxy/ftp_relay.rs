//! FTP relay proxy handshake
//!
//! Legacy relays speak FTP on the control connection: they greet with 220,
//! optionally authenticate the proxy user with USER/PASS, then switch the
//! session to the real server on `SITE host:port` (authenticated) or
//! `OPEN host:port` (anonymous relay).

use super::descriptor::{ConnectTarget, Credentials};
use super::errors::ProxyError;
use super::wire;
use super::ProxyHandshake;
use std::io::{Read, Write};

/// 220 Service ready for new user
pub const REPLY_SERVICE_READY: u16 = 220;
/// 230 User logged in, proceed
pub const REPLY_USER_LOGGED_IN: u16 = 230;
/// 331 User name okay, need password
pub const REPLY_NEED_PASSWORD: u16 = 331;

/// A complete (possibly multi-line) FTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn text(&self) -> String {
        self.lines.join("\r\n")
    }
}

fn reply_code(line: &str) -> Option<u16> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    line[..3].parse().ok()
}

/// Read one reply from the control connection
pub fn read_reply<S: Read>(stream: &mut S) -> Result<FtpReply, ProxyError> {
    let first = wire::read_line(stream)?.ok_or_else(ProxyError::closed_by_proxy)?;
    let code = reply_code(&first)
        .ok_or_else(|| ProxyError::invalid_response(format!("not an FTP reply: {first}")))?;
    let multi_line = first.as_bytes().get(3) == Some(&b'-');
    let mut lines = vec![first];

    if multi_line {
        let terminator = format!("{code:03} ");
        loop {
            let line = wire::read_line(stream)?.ok_or_else(ProxyError::closed_by_proxy)?;
            let done = line.starts_with(&terminator) || line == terminator.trim_end();
            wire::push_response_line(&mut lines, line)?;
            if done {
                break;
            }
        }
    }

    tracing::trace!(code, "FTP relay reply");
    Ok(FtpReply { code, lines })
}

/// Send one command line and wait for its reply
pub fn send_command<S: Read + Write>(
    stream: &mut S,
    command: &str,
) -> Result<FtpReply, ProxyError> {
    if command.starts_with("PASS ") {
        tracing::trace!("FTP relay command: PASS ***");
    } else {
        tracing::trace!(command, "FTP relay command");
    }
    wire::send(stream, format!("{command}\r\n").as_bytes())?;
    read_reply(stream)
}

/// FTP relay handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FtpRelayHandshake {
    /// Require a 2xx reply to the final SITE/OPEN command. Relays in the
    /// field answer inconsistently here, so this is off by default.
    pub strict_relay_reply: bool,
}

impl FtpRelayHandshake {
    pub fn new(strict_relay_reply: bool) -> Self {
        Self { strict_relay_reply }
    }

    fn login<S: Read + Write>(
        stream: &mut S,
        user: &str,
        password: Option<&str>,
    ) -> Result<(), ProxyError> {
        let reply = send_command(stream, &format!("USER {user}"))?;
        let password_required = match reply.code {
            REPLY_USER_LOGGED_IN => false,
            REPLY_NEED_PASSWORD => true,
            _ => {
                return Err(ProxyError::auth(format!(
                    "relay rejected user: {}",
                    reply.text()
                )))
            }
        };

        if password_required {
            let reply = send_command(stream, &format!("PASS {}", password.unwrap_or("")))?;
            if reply.code != REPLY_USER_LOGGED_IN {
                return Err(ProxyError::auth(format!(
                    "relay rejected password: {}",
                    reply.text()
                )));
            }
        }

        tracing::debug!("FTP relay login accepted");
        Ok(())
    }
}

impl ProxyHandshake for FtpRelayHandshake {
    fn handshake<S: Read + Write>(
        &self,
        stream: &mut S,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> Result<(), ProxyError> {
        let welcome = read_reply(stream)?;
        if welcome.code != REPLY_SERVICE_READY {
            return Err(ProxyError::invalid_response(format!(
                "unexpected relay greeting: {}",
                welcome.text()
            )));
        }

        let command = match credentials.username.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => {
                Self::login(stream, user, credentials.password.as_deref())?;
                format!("SITE {target}")
            }
            None => format!("OPEN {target}"),
        };

        let reply = send_command(stream, &command)?;
        if self.strict_relay_reply && !reply.is_positive_completion() {
            return Err(ProxyError::RelayRejected(reply.text()));
        }
        tracing::debug!(code = reply.code, "FTP relay switched session to target");
        Ok(())
    }

    fn proxy_type(&self) -> &'static str {
        "ftp"
    }
}
