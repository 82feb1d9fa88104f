//! Handshake strategy selection
//!
//! The strategy is picked once from the proxy URL scheme when a connector is
//! built and never re-dispatched on the scheme string afterwards.

use super::descriptor::{ConnectTarget, Credentials, ProxyDescriptor};
use super::errors::ProxyError;
use super::ftp_relay::FtpRelayHandshake;
use super::http_connector::HttpConnectHandshake;
use super::socks4_connector::Socks4Handshake;
use super::socks5_connector::Socks5Handshake;
use super::ProxyHandshake;
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, Default)]
pub enum HandshakeStrategy {
    /// The transport connection to the target is the session
    #[default]
    Direct,
    HttpConnect(HttpConnectHandshake),
    FtpRelay(FtpRelayHandshake),
    Socks4(Socks4Handshake),
    Socks5(Socks5Handshake),
}

impl HandshakeStrategy {
    /// Pick the strategy for a descriptor
    ///
    /// Prefix match on the scheme; `socks4` is tested before the generic
    /// `socks`. No descriptor, an empty host or an unknown scheme is Direct.
    pub fn select(descriptor: Option<&ProxyDescriptor>) -> Self {
        let Some(descriptor) = descriptor.filter(|d| !d.host.is_empty()) else {
            return Self::Direct;
        };
        let scheme = descriptor.scheme.to_ascii_lowercase();
        if scheme.starts_with("http") {
            Self::HttpConnect(HttpConnectHandshake)
        } else if scheme.starts_with("ftp") {
            Self::FtpRelay(FtpRelayHandshake::default())
        } else if scheme.starts_with("socks4") {
            Self::Socks4(Socks4Handshake::default())
        } else if scheme.starts_with("socks") {
            Self::Socks5(Socks5Handshake)
        } else {
            tracing::debug!(scheme = %scheme, "Unrecognized proxy scheme, connecting directly");
            Self::Direct
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }

    /// Short protocol name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::HttpConnect(h) => h.proxy_type(),
            Self::FtpRelay(h) => h.proxy_type(),
            Self::Socks4(h) => h.proxy_type(),
            Self::Socks5(h) => h.proxy_type(),
        }
    }

    /// Run the protocol exchange over an open connection to the proxy
    pub fn handshake<S: Read + Write>(
        &self,
        stream: &mut S,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> Result<(), ProxyError> {
        match self {
            Self::Direct => Ok(()),
            Self::HttpConnect(h) => h.handshake(stream, target, credentials),
            Self::FtpRelay(h) => h.handshake(stream, target, credentials),
            Self::Socks4(h) => h.handshake(stream, target, credentials),
            Self::Socks5(h) => h.handshake(stream, target, credentials),
        }
    }
}
