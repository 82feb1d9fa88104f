//! SOCKS4 / SOCKS4a proxy handshake
//!
//! The destination is sent as an IPv4 address when it resolves locally.
//! Otherwise the request switches to SOCKS4a: the address field carries the
//! placeholder `0.0.0.1` and the hostname follows the user id so the proxy
//! resolves it.

use super::descriptor::{ConnectTarget, Credentials};
use super::errors::{ProxyError, Socks4Reply};
use super::wire;
use super::ProxyHandshake;
use std::fmt;
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

/// SOCKS4 protocol version
const SOCKS4_VERSION: u8 = 0x04;

/// SOCKS4 command: CONNECT
const CMD_CONNECT: u8 = 0x01;

/// Reply version byte
const REPLY_VERSION: u8 = 0x00;

/// Reply: request granted
const REP_GRANTED: u8 = 0x5A;

/// SOCKS4a marker address 0.0.0.1
const SOCKS4A_PLACEHOLDER: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Resolves a hostname to the IPv4 address put in the request
pub type Ipv4Resolver = fn(&str, u16) -> Option<Ipv4Addr>;

/// Default resolver: IPv4 literal, else the first IPv4 result of a system lookup
pub fn resolve_ipv4(host: &str, port: u16) -> Option<Ipv4Addr> {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => return Some(ip),
        Ok(IpAddr::V6(_)) => return None,
        Err(_) => {}
    }
    (host, port)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
}

/// SOCKS4 handshake with automatic SOCKS4a fallback
#[derive(Clone, Copy)]
pub struct Socks4Handshake {
    resolver: Ipv4Resolver,
}

impl Default for Socks4Handshake {
    fn default() -> Self {
        Self {
            resolver: resolve_ipv4,
        }
    }
}

impl fmt::Debug for Socks4Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socks4Handshake").finish_non_exhaustive()
    }
}

impl Socks4Handshake {
    pub fn with_resolver(resolver: Ipv4Resolver) -> Self {
        Self { resolver }
    }

    /// Build the CONNECT request; returns the bytes and whether 4a was used
    pub fn build_request(
        &self,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> (Vec<u8>, bool) {
        let resolved = (self.resolver)(&target.host, target.port);
        let socks4a = resolved.is_none();

        // VN | CD | DSTPORT | DSTIP | USERID | NULL [| HOSTNAME | NULL]
        let mut request = vec![SOCKS4_VERSION, CMD_CONNECT];
        request.extend_from_slice(&target.port.to_be_bytes());
        match resolved {
            Some(ip) => request.extend_from_slice(&ip.octets()),
            None => request.extend_from_slice(&SOCKS4A_PLACEHOLDER),
        }
        if let Some(user) = &credentials.username {
            request.extend_from_slice(user.as_bytes());
        }
        request.push(0x00);
        if socks4a {
            request.extend_from_slice(target.host.as_bytes());
            request.push(0x00);
        }
        (request, socks4a)
    }
}

impl ProxyHandshake for Socks4Handshake {
    fn handshake<S: Read + Write>(
        &self,
        stream: &mut S,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> Result<(), ProxyError> {
        let (request, socks4a) = self.build_request(target, credentials);
        if socks4a {
            tracing::debug!(target.host = %target.host, "Cannot resolve host locally, using SOCKS4a");
        }
        wire::send(stream, &request)?;

        let version = wire::read_u8(stream)?;
        if version != REPLY_VERSION {
            return Err(ProxyError::invalid_response(format!(
                "SOCKS4 reply version 0x{version:02x}"
            )));
        }

        let status = wire::read_u8(stream)?;
        if status == REP_GRANTED {
            // DSTPORT and DSTIP are meaningless for CONNECT
            wire::skip(stream, 6)?;
            tracing::debug!(socks4a, "SOCKS4 request granted");
            return Ok(());
        }

        match Socks4Reply::from_code(status) {
            Some(reply) => Err(ProxyError::Socks4Rejected(reply)),
            None => Err(ProxyError::invalid_response(format!(
                "unknown SOCKS4 status 0x{status:02x}"
            ))),
        }
    }

    fn proxy_type(&self) -> &'static str {
        "socks4"
    }
}
