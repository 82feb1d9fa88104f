//! Socket factory adapters
//!
//! Hosts that create their own sockets (FTP clients and the like) take a
//! factory instead of a connector. Client sockets tunnel through the
//! configured proxy; server sockets are never proxied.

use super::connector::{listen, ProxyConnector, DEFAULT_BACKLOG};
use super::errors::ProxyError;
use super::socket::ProxySocket;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};

/// Source of client connections
pub trait SocketFactory: Send + Sync {
    /// Unconnected socket
    fn create_socket(&self) -> ProxySocket;

    fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream>;

    fn connect_from(&self, host: &str, port: u16, local: SocketAddr) -> io::Result<TcpStream>;
}

/// Source of listening sockets
pub trait ServerSocketFactory: Send + Sync {
    fn bind(&self, port: u16) -> io::Result<TcpListener>;

    fn bind_with_backlog(&self, port: u16, backlog: i32) -> io::Result<TcpListener>;

    fn bind_on(&self, port: u16, backlog: i32, ip: IpAddr) -> io::Result<TcpListener>;
}

/// Client socket factory backed by a [`ProxyConnector`]
#[derive(Debug, Clone, Default)]
pub struct ProxySocketFactory {
    connector: ProxyConnector,
}

impl ProxySocketFactory {
    pub fn new(proxy_url: Option<&str>) -> Result<Self, ProxyError> {
        Ok(Self::with_connector(ProxyConnector::new(proxy_url)?))
    }

    pub fn with_connector(connector: ProxyConnector) -> Self {
        Self { connector }
    }

    /// Replace the proxy used by sockets created from now on
    pub fn set_proxy_url(&mut self, proxy_url: Option<&str>) -> Result<(), ProxyError> {
        self.connector = ProxyConnector::new(proxy_url)?;
        Ok(())
    }

    pub fn connector(&self) -> &ProxyConnector {
        &self.connector
    }
}

impl SocketFactory for ProxySocketFactory {
    fn create_socket(&self) -> ProxySocket {
        self.connector.create_socket()
    }

    fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        Ok(self.connector.connect(host, port)?.into_stream()?)
    }

    fn connect_from(&self, host: &str, port: u16, local: SocketAddr) -> io::Result<TcpStream> {
        Ok(self
            .connector
            .connect_from(host, port, local)?
            .into_stream()?)
    }
}

/// Plain listening sockets with the requested backlog
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyServerSocketFactory;

impl ServerSocketFactory for ProxyServerSocketFactory {
    fn bind(&self, port: u16) -> io::Result<TcpListener> {
        self.bind_with_backlog(port, DEFAULT_BACKLOG)
    }

    fn bind_with_backlog(&self, port: u16, backlog: i32) -> io::Result<TcpListener> {
        self.bind_on(port, backlog, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    fn bind_on(&self, port: u16, backlog: i32, ip: IpAddr) -> io::Result<TcpListener> {
        listen(SocketAddr::new(ip, port), backlog)
    }
}
