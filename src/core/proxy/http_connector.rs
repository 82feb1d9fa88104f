//! HTTP/HTTPS proxy handshake
//!
//! Implements the HTTP CONNECT tunnel method (RFC 9110 §9.3.6) over an
//! already-open connection to the proxy, with optional Basic authentication.

use super::descriptor::{ConnectTarget, Credentials};
use super::errors::ProxyError;
use super::wire;
use super::ProxyHandshake;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::io::{Read, Write};

/// HTTP CONNECT handshake
///
/// The response is read one byte at a time up to the blank line that ends
/// the headers, leaving every later byte for the tunneled protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpConnectHandshake;

impl HttpConnectHandshake {
    /// Generate Basic authentication header value
    pub fn generate_auth_header(credentials: &Credentials) -> Option<String> {
        credentials.pair().map(|(user, pass)| {
            let encoded = STANDARD.encode(format!("{user}:{pass}").as_bytes());
            format!("Basic {encoded}")
        })
    }

    /// Build the full CONNECT request, headers and terminating blank line
    pub fn build_request(target: &ConnectTarget, credentials: &Credentials) -> String {
        let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
        if let Some(auth) = Self::generate_auth_header(credentials) {
            request.push_str(&format!("Proxy-Authorization: {auth}\r\n"));
            tracing::debug!("Added Basic authentication to CONNECT request");
        }
        request.push_str("\r\n");
        request
    }

    /// Parse the status code out of the first response line
    fn parse_status(status_line: &str) -> Result<u16, ProxyError> {
        let bytes = status_line.as_bytes();
        if !status_line.starts_with("HTTP/") || bytes.len() < 12 {
            return Err(ProxyError::invalid_response(format!(
                "unexpected status line: {status_line}"
            )));
        }
        let code = &bytes[9..12];
        if !code.iter().all(u8::is_ascii_digit) {
            return Err(ProxyError::invalid_response(format!(
                "invalid status code in response: {status_line}"
            )));
        }
        Ok(code
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0')))
    }
}

impl ProxyHandshake for HttpConnectHandshake {
    fn handshake<S: Read + Write>(
        &self,
        stream: &mut S,
        target: &ConnectTarget,
        credentials: &Credentials,
    ) -> Result<(), ProxyError> {
        let request = Self::build_request(target, credentials);
        tracing::debug!(target.host = %target.host, target.port = target.port, "Sending CONNECT request");
        wire::send(stream, request.as_bytes())?;

        let mut lines = Vec::new();
        while let Some(line) = wire::read_line(stream)? {
            if line.is_empty() {
                break;
            }
            tracing::trace!(line = %line, "CONNECT response line");
            wire::push_response_line(&mut lines, line)?;
        }

        let status_line = lines
            .first()
            .ok_or_else(|| ProxyError::invalid_response("empty response to CONNECT"))?;
        let status = Self::parse_status(status_line)?;
        tracing::debug!(status, "Proxy response status code");

        if status != 200 {
            tracing::warn!(status, "Proxy refused CONNECT");
            let mut response = String::new();
            for line in &lines {
                response.push_str(line);
                response.push_str("\r\n");
            }
            return Err(ProxyError::HttpRejected { status, response });
        }

        tracing::debug!("CONNECT tunnel established");
        Ok(())
    }

    fn proxy_type(&self) -> &'static str {
        "http"
    }
}
