//! SOCKS5 proxy handshake
//!
//! Client side of RFC 1928 restricted to CONNECT, plus RFC 1929
//! username/password authentication:
//!
//! 1. Method negotiation: exactly one method is offered, `0x02` when a
//!    username and password are configured, otherwise `0x00`
//! 2. Optional username/password sub-negotiation
//! 3. CONNECT request, always with a domain-name address so the proxy
//!    resolves the target
//! 4. Reply; the bound address and port are read and discarded

use super::descriptor::{ConnectTarget, Credentials};
use super::errors::{ProxyError, Socks5Reply};
use super::wire;
use super::ProxyHandshake;
use std::io::{Read, Write};

/// SOCKS5 protocol version
const SOCKS5_VERSION: u8 = 0x05;

/// Auth method: no authentication
const AUTH_NO_AUTH: u8 = 0x00;

/// Auth method: username/password
const AUTH_USERNAME_PASSWORD: u8 = 0x02;

/// Username/password sub-negotiation version
const AUTH_SUBNEG_VERSION: u8 = 0x01;

/// Command: CONNECT
const CMD_CONNECT: u8 = 0x01;

const RESERVED: u8 = 0x00;

/// Address type: IPv4
const ATYP_IPV4: u8 = 0x01;

/// Address type: domain name
const ATYP_DOMAIN: u8 = 0x03;

/// Address type: IPv6
const ATYP_IPV6: u8 = 0x04;

/// Reply: succeeded
const REP_SUCCESS: u8 = 0x00;

/// SOCKS5 handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Socks5Handshake;

impl Socks5Handshake {
    /// Version/method selection message
    pub fn method_request(credentials: &Credentials) -> [u8; 3] {
        let method = if credentials.pair().is_some() {
            AUTH_USERNAME_PASSWORD
        } else {
            AUTH_NO_AUTH
        };
        [SOCKS5_VERSION, 0x01, method]
    }

    /// Username/password sub-negotiation: VER | ULEN | UNAME | PLEN | PASSWD
    pub fn auth_request(username: &str, password: &str) -> Result<Vec<u8>, ProxyError> {
        let mut request = Vec::with_capacity(3 + username.len() + password.len());
        request.push(AUTH_SUBNEG_VERSION);
        wire::push_len_prefixed(&mut request, username.as_bytes(), "username")?;
        wire::push_len_prefixed(&mut request, password.as_bytes(), "password")?;
        Ok(request)
    }

    /// CONNECT request: VER | CMD | RSV | ATYP | DST.ADDR | DST.PORT
    pub fn connect_request(target: &ConnectTarget) -> Result<Vec<u8>, ProxyError> {
        let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, RESERVED, ATYP_DOMAIN];
        wire::push_len_prefixed(&mut request, target.host.as_bytes(), "domain name")?;
        request.extend_from_slice(&target.port.to_be_bytes());
        Ok(request)
    }

    fn negotiate_method<S: Read + Write>(
        stream: &mut S,
        credentials: &Credentials,
    ) -> Result<u8, ProxyError> {
        let request = Self::method_request(credentials);
        wire::send(stream, &request)?;
        tracing::debug!(method = request[2], "Sent SOCKS5 method negotiation");

        let version = wire::read_u8(stream)?;
        if version != SOCKS5_VERSION {
            return Err(ProxyError::invalid_response(format!(
                "expected SOCKS version 0x05, got 0x{version:02x}"
            )));
        }
        let chosen = wire::read_u8(stream)?;
        tracing::debug!(method = chosen, "SOCKS5 server chose authentication method");
        Ok(chosen)
    }

    fn authenticate_password<S: Read + Write>(
        stream: &mut S,
        request: &[u8],
    ) -> Result<(), ProxyError> {
        wire::send(stream, request)?;

        let version = wire::read_u8(stream)?;
        if version != AUTH_SUBNEG_VERSION {
            return Err(ProxyError::invalid_response(format!(
                "invalid auth subnegotiation version 0x{version:02x}"
            )));
        }
        let status = wire::read_u8(stream)?;
        if status != 0x00 {
            return Err(ProxyError::auth(format!("status 0x{status:02x}")));
        }

        tracing::debug!("Username/password authentication successful");
        Ok(())
    }

    fn read_connect_reply<S: Read>(stream: &mut S) -> Result<(), ProxyError> {
        let version = wire::read_u8(stream)?;
        if version != SOCKS5_VERSION {
            return Err(ProxyError::invalid_response(format!(
                "expected SOCKS version 0x05 in reply, got 0x{version:02x}"
            )));
        }

        let rep = wire::read_u8(stream)?;
        if rep != REP_SUCCESS {
            return Err(match Socks5Reply::from_code(rep) {
                Some(reply) => ProxyError::Socks5Rejected(reply),
                None => ProxyError::invalid_response(format!("unknown reply code 0x{rep:02x}")),
            });
        }

        wire::skip(stream, 1)?;
        let atyp = wire::read_u8(stream)?;
        let addr_len = match atyp {
            ATYP_IPV4 => 4,
            ATYP_IPV6 => 16,
            ATYP_DOMAIN => usize::from(wire::read_u8(stream)?),
            other => {
                return Err(ProxyError::invalid_response(format!(
                    "unknown address type 0x{other:02x}"
                )))
            }
        };
        // BND.ADDR then BND.PORT
        wire::skip(stream, addr_len + 2)?;
        Ok(())
    }
}

impl ProxyHandshake for Socks5Handshake {
    fn handshake<S: Read + Write>(
        &self,
        stream: &mut S,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> Result<(), ProxyError> {
        // Every length-limited field is checked before the first byte goes out
        let auth_request = credentials
            .pair()
            .map(|(user, pass)| Self::auth_request(user, pass))
            .transpose()?;
        let connect_request = Self::connect_request(target)?;

        let chosen = Self::negotiate_method(stream, credentials)?;
        match (&auth_request, chosen) {
            (Some(request), AUTH_USERNAME_PASSWORD) => {
                Self::authenticate_password(stream, request)?
            }
            (Some(_), other) => return Err(ProxyError::UnsupportedAuthMethod(other)),
            (None, AUTH_NO_AUTH) => tracing::debug!("Using No Auth (0x00)"),
            (None, _) => return Err(ProxyError::AuthenticationRequired),
        }

        wire::send(stream, &connect_request)?;
        tracing::debug!(
            target.host = %target.host,
            target.port = target.port,
            "Sent SOCKS5 connect request"
        );

        Self::read_connect_reply(stream)?;
        tracing::debug!("SOCKS5 connect response: success");
        Ok(())
    }

    fn proxy_type(&self) -> &'static str {
        "socks5"
    }
}
