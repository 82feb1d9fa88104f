//! Tunneling socket
//!
//! A [`ProxySocket`] starts idle. `connect` opens the transport connection
//! (to the proxy when one is configured, otherwise to the target), runs the
//! selected handshake over it, and only then reports the socket connected.
//! Any failure closes the transport before the error is returned, so a socket
//! is never left connected to the proxy but not to the target.

use super::connector::ProxyConnector;
use super::descriptor::ConnectTarget;
use super::errors::ProxyError;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CloseState {
    closed: bool,
    /// Duplicate handle of the live transport, used to shut it down from
    /// another thread
    transport: Option<TcpStream>,
}

#[derive(Debug, Default)]
struct Shared(Mutex<CloseState>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CloseState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        if let Some(transport) = state.transport.take() {
            let _ = transport.shutdown(Shutdown::Both);
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Closes a [`ProxySocket`] from another thread
///
/// Any read or write blocked on the socket, including one inside a running
/// handshake, fails promptly once `close` is called. A transport connect that
/// is still in progress is not interrupted; the socket is closed as soon as
/// that connect returns.
#[derive(Debug, Clone)]
pub struct SocketCloser {
    shared: Arc<Shared>,
}

impl SocketCloser {
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

/// Proxy-aware client socket
#[derive(Debug)]
pub struct ProxySocket {
    connector: ProxyConnector,
    local_bind: Option<SocketAddr>,
    /// Caller-supplied unconnected handle, consumed by the first connect attempt
    handle: Option<Socket>,
    stream: Option<TcpStream>,
    shared: Arc<Shared>,
}

impl ProxySocket {
    pub(crate) fn new(connector: ProxyConnector) -> Self {
        Self {
            connector,
            local_bind: None,
            handle: None,
            stream: None,
            shared: Arc::new(Shared::default()),
        }
    }

    pub(crate) fn with_local_bind(mut self, local: SocketAddr) -> Self {
        self.local_bind = Some(local);
        self
    }

    pub(crate) fn with_handle(mut self, handle: Socket) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn closer(&self) -> SocketCloser {
        SocketCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.live_stream()?.local_addr()
    }

    /// Address of the transport peer: the proxy when tunneling
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.live_stream()?.peer_addr()
    }

    /// Connect to `target`, tunneling through the proxy if one is configured
    ///
    /// `timeout` bounds the transport connect; `None` or a zero duration
    /// waits indefinitely.
    pub fn connect(
        &mut self,
        target: &ConnectTarget,
        timeout: Option<Duration>,
    ) -> Result<(), ProxyError> {
        target.validate()?;
        let timeout = timeout.filter(|t| !t.is_zero());
        if self.is_closed() {
            return Err(ProxyError::illegal_state("Socket is closed"));
        }
        if self.stream.is_some() {
            return Err(ProxyError::illegal_state("Socket is already connected"));
        }

        let start = Instant::now();
        let connector = self.connector.clone();
        let strategy = connector.strategy();

        let (host, port) = match connector.descriptor() {
            Some(descriptor) if !strategy.is_direct() => {
                tracing::debug!(
                    proxy.url = %descriptor.sanitized_url(),
                    proxy.type = strategy.name(),
                    target.host = %target.host,
                    target.port = target.port,
                    "Connecting through proxy"
                );
                descriptor.endpoint()
            }
            _ => {
                tracing::trace!(target.host = %target.host, target.port = target.port, "Connecting directly");
                (target.host.as_str(), target.port)
            }
        };

        let result = self
            .open_transport(host, port, timeout)
            .and_then(|mut stream| {
                self.register_transport(&stream)?;
                if !strategy.is_direct() {
                    let handshake_timeout = connector.handshake_timeout().or(timeout);
                    run_handshake(&mut stream, &connector, target, handshake_timeout)?;
                }
                Ok(stream)
            });

        match result {
            Ok(stream) => {
                tracing::info!(
                    proxy.type = strategy.name(),
                    target.host = %target.host,
                    target.port = target.port,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Connection established"
                );
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    proxy.type = strategy.name(),
                    error = %e,
                    error_category = e.category(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Connection attempt failed"
                );
                self.shared.close();
                Err(e)
            }
        }
    }

    /// Close the socket; safe to call repeatedly or before connecting
    pub fn close(&mut self) {
        self.shared.close();
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.handle = None;
    }

    /// Hand the connected stream over to the caller
    ///
    /// Closers obtained from this socket no longer affect the returned stream.
    pub fn into_stream(mut self) -> Result<TcpStream, ProxyError> {
        if self.is_closed() {
            return Err(ProxyError::illegal_state("Socket is closed"));
        }
        let stream = self
            .stream
            .take()
            .ok_or_else(|| ProxyError::illegal_state("Socket is not connected"))?;
        // Drop the duplicate without shutting the connection down
        self.shared.lock().transport = None;
        Ok(stream)
    }

    fn live_stream(&self) -> io::Result<&TcpStream> {
        match &self.stream {
            Some(stream) if !self.is_closed() => Ok(stream),
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket is not connected",
            )),
        }
    }

    fn register_transport(&self, stream: &TcpStream) -> Result<(), ProxyError> {
        let mut state = self.shared.lock();
        if state.closed {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(ProxyError::illegal_state("Socket closed while connecting"));
        }
        state.transport = match stream.try_clone() {
            Ok(clone) => Some(clone),
            Err(e) => {
                tracing::debug!(error = %e, "Cannot duplicate transport handle, closer will not interrupt I/O");
                None
            }
        };
        Ok(())
    }

    fn open_transport(
        &mut self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<TcpStream, ProxyError> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(ProxyError::Transport)?
            .collect();
        if addrs.is_empty() {
            return Err(ProxyError::Transport(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {host}:{port}"),
            )));
        }

        if let Some(handle) = self.handle.take() {
            let addr = address_for_handle(&handle, &addrs);
            return connect_socket(handle, &addr, self.local_bind, timeout)
                .map_err(ProxyError::Transport);
        }

        let mut last_err = None;
        for addr in &addrs {
            let attempt = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))
                .and_then(|socket| connect_socket(socket, addr, self.local_bind, timeout));
            match attempt {
                Ok(stream) => {
                    tracing::debug!(addr = %addr, "Transport connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(addr = %addr, error = %e, "Transport connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(ProxyError::Transport(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "transport connect failed")
        })))
    }
}

/// First resolved address in the handle's address family
///
/// The family is read from the handle's (unbound) local address; when the
/// platform cannot report it, the first address is used.
fn address_for_handle(handle: &Socket, addrs: &[SocketAddr]) -> SocketAddr {
    let ipv4 = handle
        .local_addr()
        .ok()
        .and_then(|addr| addr.as_socket())
        .map(|addr| addr.is_ipv4());
    addrs
        .iter()
        .find(|addr| ipv4.map_or(true, |v4| addr.is_ipv4() == v4))
        .copied()
        .unwrap_or(addrs[0])
}

fn connect_socket(
    socket: Socket,
    addr: &SocketAddr,
    local_bind: Option<SocketAddr>,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    if let Some(local) = local_bind {
        socket.bind(&SockAddr::from(local))?;
    }
    let addr = SockAddr::from(*addr);
    match timeout {
        Some(timeout) => socket.connect_timeout(&addr, timeout)?,
        None => socket.connect(&addr)?,
    }
    Ok(socket.into())
}

fn run_handshake(
    stream: &mut TcpStream,
    connector: &ProxyConnector,
    target: &ConnectTarget,
    timeout: Option<Duration>,
) -> Result<(), ProxyError> {
    stream
        .set_read_timeout(timeout)
        .map_err(ProxyError::Transport)?;
    stream
        .set_write_timeout(timeout)
        .map_err(ProxyError::Transport)?;

    connector
        .strategy()
        .handshake(stream, target, connector.credentials())?;

    // From here on the socket is a plain channel to the target
    stream.set_read_timeout(None).map_err(ProxyError::Transport)?;
    stream.set_write_timeout(None).map_err(ProxyError::Transport)
}

impl Read for ProxySocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.live_stream()?;
        match self.stream.as_mut() {
            Some(stream) => stream.read(buf),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

impl Write for ProxySocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.live_stream()?;
        match self.stream.as_mut() {
            Some(stream) => stream.write(buf),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for ProxySocket {
    fn drop(&mut self) {
        if self.stream.is_some() {
            self.close();
        } else {
            // Release the duplicate handle without touching a handed-off stream
            self.shared.lock().transport = None;
        }
    }
}
