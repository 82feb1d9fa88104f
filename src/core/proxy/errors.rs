//! Proxy error types for classification and handling

use std::fmt;
use std::io;
use thiserror::Error;

/// Reply codes a SOCKS4 proxy can use to reject a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Reply {
    /// 0x5B
    RejectedOrFailed,
    /// 0x5C: the proxy could not reach an identd on the client
    CannotValidateUser,
    /// 0x5D: identd reported a different user id
    InvalidUser,
}

impl Socks4Reply {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x5B => Some(Self::RejectedOrFailed),
            0x5C => Some(Self::CannotValidateUser),
            0x5D => Some(Self::InvalidUser),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::RejectedOrFailed => 0x5B,
            Self::CannotValidateUser => 0x5C,
            Self::InvalidUser => 0x5D,
        }
    }
}

impl fmt::Display for Socks4Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::RejectedOrFailed => "connection refused/failed",
            Self::CannotValidateUser => "cannot validate the user",
            Self::InvalidUser => "invalid user",
        };
        write!(f, "{msg} (code 0x{:02x})", self.code())
    }
}

/// Failure replies defined by RFC 1928
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5Reply {
    GeneralFailure,
    NotAllowedByRuleset,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
}

impl Socks5Reply {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::GeneralFailure),
            0x02 => Some(Self::NotAllowedByRuleset),
            0x03 => Some(Self::NetworkUnreachable),
            0x04 => Some(Self::HostUnreachable),
            0x05 => Some(Self::ConnectionRefused),
            0x06 => Some(Self::TtlExpired),
            0x07 => Some(Self::CommandNotSupported),
            0x08 => Some(Self::AddressTypeNotSupported),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::GeneralFailure => 0x01,
            Self::NotAllowedByRuleset => 0x02,
            Self::NetworkUnreachable => 0x03,
            Self::HostUnreachable => 0x04,
            Self::ConnectionRefused => 0x05,
            Self::TtlExpired => 0x06,
            Self::CommandNotSupported => 0x07,
            Self::AddressTypeNotSupported => 0x08,
        }
    }
}

impl fmt::Display for Socks5Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::GeneralFailure => "general failure",
            Self::NotAllowedByRuleset => "connection not allowed by ruleset",
            Self::NetworkUnreachable => "network unreachable",
            Self::HostUnreachable => "host unreachable",
            Self::ConnectionRefused => "connection refused by destination host",
            Self::TtlExpired => "TTL expired",
            Self::CommandNotSupported => "command not supported / protocol error",
            Self::AddressTypeNotSupported => "address type not supported",
        };
        write!(f, "{msg} (code 0x{:02x})", self.code())
    }
}

/// Proxy-specific error types for better error classification
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy URL could not be parsed
    #[error("Malformed proxy URL: {0}")]
    MalformedUrl(String),

    /// Framing violation, unexpected byte, or premature end-of-stream
    #[error("Invalid proxy response: {0}")]
    InvalidResponse(String),

    /// Credentials were rejected by the proxy
    #[error("Proxy authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No credentials were offered but the proxy insists on them
    #[error("Proxy requires authentication")]
    AuthenticationRequired,

    /// HTTP CONNECT answered with a status other than 200
    #[error("HTTP proxy connection failed with status {status}\r\nResponse received from the proxy:\r\n{response}")]
    HttpRejected { status: u16, response: String },

    #[error("SOCKS4 proxy rejected the request: {0}")]
    Socks4Rejected(Socks4Reply),

    #[error("SOCKS5 proxy rejected the request: {0}")]
    Socks5Rejected(Socks5Reply),

    /// FTP relay refused to open the session to the target
    #[error("FTP relay refused the connection: {0}")]
    RelayRejected(String),

    /// A length-prefixed SOCKS field would exceed 255 bytes
    #[error("{0} too long (max 255 bytes)")]
    TooLong(&'static str),

    #[error("Proxy chose an unsupported authentication method: 0x{0:02x}")]
    UnsupportedAuthMethod(u8),

    /// Underlying network error while connecting to the proxy or target
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl ProxyError {
    pub fn malformed_url(msg: impl Into<String>) -> Self {
        ProxyError::MalformedUrl(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        ProxyError::InvalidResponse(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        ProxyError::AuthenticationFailed(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ProxyError::InvalidArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        ProxyError::IllegalState(msg.into())
    }

    /// End-of-stream while the handshake still expected bytes
    pub fn closed_by_proxy() -> Self {
        ProxyError::InvalidResponse("connection closed by the proxy".to_string())
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::MalformedUrl(_) => "config",
            ProxyError::InvalidResponse(_) => "protocol",
            ProxyError::AuthenticationFailed(_) | ProxyError::AuthenticationRequired => "auth",
            ProxyError::HttpRejected { .. }
            | ProxyError::Socks4Rejected(_)
            | ProxyError::Socks5Rejected(_)
            | ProxyError::RelayRejected(_) => "refused",
            ProxyError::TooLong(_) => "too_long",
            ProxyError::UnsupportedAuthMethod(_) => "unsupported",
            ProxyError::Transport(e) if e.kind() == io::ErrorKind::TimedOut => "timeout",
            ProxyError::Transport(_) => "network",
            ProxyError::InvalidArgument(_) | ProxyError::IllegalState(_) => "usage",
        }
    }
}

impl From<ProxyError> for io::Error {
    fn from(err: ProxyError) -> Self {
        let kind = match &err {
            ProxyError::Transport(e) => return io::Error::new(e.kind(), err),
            ProxyError::MalformedUrl(_) | ProxyError::InvalidArgument(_) => {
                io::ErrorKind::InvalidInput
            }
            ProxyError::IllegalState(_) => io::ErrorKind::NotConnected,
            ProxyError::AuthenticationFailed(_) | ProxyError::AuthenticationRequired => {
                io::ErrorKind::PermissionDenied
            }
            ProxyError::HttpRejected { .. }
            | ProxyError::Socks4Rejected(_)
            | ProxyError::Socks5Rejected(_)
            | ProxyError::RelayRejected(_) => io::ErrorKind::ConnectionRefused,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}
