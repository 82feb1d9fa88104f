//! Proxy tunneling for outbound TCP connections
//!
//! This module provides:
//! - Proxy URL parsing and configuration
//! - Handshakes for HTTP CONNECT, FTP relays, SOCKS4/4a and SOCKS5
//! - A proxy-aware socket and connector that hide the tunnel from callers
//! - Socket factory adapters for hosts that create their own sockets

pub mod config;
pub mod connector;
pub mod descriptor;
pub mod errors;
pub mod factory;
pub mod ftp_relay;
pub mod http_connector;
pub mod socket;
pub mod socks4_connector;
pub mod socks5_connector;
pub mod strategy;
pub(crate) mod wire;

pub use config::ProxyConfig;
pub use connector::ProxyConnector;
pub use descriptor::{parse_proxy_url, ConnectTarget, Credentials, ProxyDescriptor};
pub use errors::{ProxyError, Socks4Reply, Socks5Reply};
pub use factory::{ProxyServerSocketFactory, ProxySocketFactory, ServerSocketFactory, SocketFactory};
pub use ftp_relay::FtpRelayHandshake;
pub use http_connector::HttpConnectHandshake;
pub use socket::{ProxySocket, SocketCloser};
pub use socks4_connector::Socks4Handshake;
pub use socks5_connector::Socks5Handshake;
pub use strategy::HandshakeStrategy;

use std::io::{Read, Write};

/// Trait for proxy handshakes
///
/// A handshake runs over an already-open connection to the proxy and, on
/// success, leaves the stream positioned at the first byte from the target.
/// Implementations never close the stream; the caller owns cleanup.
pub trait ProxyHandshake: Send + Sync {
    /// Ask the proxy to open a tunnel to `target`
    fn handshake<S: Read + Write>(
        &self,
        stream: &mut S,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> Result<(), ProxyError>;

    /// Get the proxy type name for logging
    fn proxy_type(&self) -> &'static str;
}
