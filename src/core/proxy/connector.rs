//! Proxy connector
//!
//! Holds the parsed proxy descriptor and the handshake strategy selected for
//! it, and hands out [`ProxySocket`]s that tunnel through that proxy.

use super::config::ProxyConfig;
use super::descriptor::{parse_proxy_url, ConnectTarget, Credentials, ProxyDescriptor};
use super::errors::ProxyError;
use super::ftp_relay::FtpRelayHandshake;
use super::socket::ProxySocket;
use super::strategy::HandshakeStrategy;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

/// Listen backlog used when none (or a non-positive one) is given
pub const DEFAULT_BACKLOG: i32 = 50;

#[derive(Debug)]
struct Inner {
    descriptor: Option<ProxyDescriptor>,
    credentials: Credentials,
    strategy: HandshakeStrategy,
    connect_timeout: Option<Duration>,
    handshake_timeout: Option<Duration>,
}

/// Creates proxy-aware sockets for one proxy configuration
///
/// Cheap to clone; all clones share the same immutable state.
#[derive(Debug, Clone)]
pub struct ProxyConnector {
    inner: Arc<Inner>,
}

impl Default for ProxyConnector {
    fn default() -> Self {
        Self::direct()
    }
}

impl ProxyConnector {
    /// Create a connector from an optional proxy URL; `None` or an empty
    /// string connects directly
    pub fn new(proxy_url: Option<&str>) -> Result<Self, ProxyError> {
        Self::from_config(&ProxyConfig {
            url: proxy_url.map(str::to_string),
            ..Default::default()
        })
    }

    /// Connector that never uses a proxy
    pub fn direct() -> Self {
        let config = ProxyConfig::default();
        Self {
            inner: Arc::new(Inner {
                descriptor: None,
                credentials: Credentials::default(),
                strategy: HandshakeStrategy::Direct,
                connect_timeout: config.connect_timeout(),
                handshake_timeout: config.handshake_timeout(),
            }),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let descriptor = match config.proxy_url() {
            Some(url) => parse_proxy_url(url)?,
            None => None,
        };

        let strategy = match HandshakeStrategy::select(descriptor.as_ref()) {
            HandshakeStrategy::FtpRelay(_) => {
                HandshakeStrategy::FtpRelay(FtpRelayHandshake::new(config.strict_relay_reply))
            }
            other => other,
        };

        match &descriptor {
            Some(d) if !strategy.is_direct() => tracing::debug!(
                proxy.type = strategy.name(),
                proxy.url = %d.sanitized_url(),
                "Proxy connector created"
            ),
            _ => tracing::debug!("Direct connector created"),
        }

        let credentials = descriptor
            .as_ref()
            .map(|d| d.credentials.clone())
            .unwrap_or_default();

        Ok(Self {
            inner: Arc::new(Inner {
                descriptor,
                credentials,
                strategy,
                connect_timeout: config.connect_timeout(),
                handshake_timeout: config.handshake_timeout(),
            }),
        })
    }

    /// Copy of this connector with different timeouts; a zero duration
    /// disables the corresponding timeout
    pub fn with_timeouts(&self, connect: Option<Duration>, handshake: Option<Duration>) -> Self {
        let nonzero = |d: Option<Duration>| d.filter(|d| !d.is_zero());
        Self {
            inner: Arc::new(Inner {
                descriptor: self.inner.descriptor.clone(),
                credentials: self.inner.credentials.clone(),
                strategy: self.inner.strategy,
                connect_timeout: nonzero(connect),
                handshake_timeout: nonzero(handshake),
            }),
        }
    }

    pub fn descriptor(&self) -> Option<&ProxyDescriptor> {
        self.inner.descriptor.as_ref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    pub fn strategy(&self) -> HandshakeStrategy {
        self.inner.strategy
    }

    /// True when connections go through a proxy
    pub fn is_proxy_configured(&self) -> bool {
        !self.inner.strategy.is_direct()
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.inner.connect_timeout
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.inner.handshake_timeout
    }

    /// Unconnected socket bound to this connector's proxy settings
    pub fn create_socket(&self) -> ProxySocket {
        ProxySocket::new(self.clone())
    }

    /// Connected socket to `host:port`
    pub fn connect(&self, host: &str, port: u16) -> Result<ProxySocket, ProxyError> {
        let mut socket = self.create_socket();
        socket.connect(&ConnectTarget::new(host, port), self.connect_timeout())?;
        Ok(socket)
    }

    /// Connected socket whose transport is bound to `local` first
    pub fn connect_from(
        &self,
        host: &str,
        port: u16,
        local: SocketAddr,
    ) -> Result<ProxySocket, ProxyError> {
        let mut socket = self.create_socket().with_local_bind(local);
        socket.connect(&ConnectTarget::new(host, port), self.connect_timeout())?;
        Ok(socket)
    }

    /// Wrap a caller-created, unconnected handle; its options are kept for
    /// the transport connection
    pub fn socket_from(&self, handle: Socket) -> ProxySocket {
        self.create_socket().with_handle(handle)
    }

    /// Listening socket on all interfaces; never proxied
    pub fn bind_server(&self, port: u16) -> std::io::Result<TcpListener> {
        self.bind_server_with_backlog(port, DEFAULT_BACKLOG)
    }

    pub fn bind_server_with_backlog(&self, port: u16, backlog: i32) -> std::io::Result<TcpListener> {
        self.bind_server_on(port, backlog, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub fn bind_server_on(&self, port: u16, backlog: i32, ip: IpAddr) -> std::io::Result<TcpListener> {
        listen(SocketAddr::new(ip, port), backlog)
    }
}

/// Bind and listen through socket2 so the backlog is honored
pub(crate) fn listen(addr: SocketAddr, backlog: i32) -> std::io::Result<TcpListener> {
    let backlog = if backlog > 0 { backlog } else { DEFAULT_BACKLOG };
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(backlog)?;
    tracing::debug!(addr = %addr, backlog, "Server socket listening");
    Ok(socket.into())
}
