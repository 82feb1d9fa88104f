//! Proxy endpoint description parsed from a proxy URL
//!
//! Accepted form: `scheme://[user[:password]@]host[:port][/]`. The user-info
//! part is split off before the rest goes through [`url::Url`], so values such
//! as `DOMAIN\user` survive verbatim even for schemes where WHATWG parsing
//! would treat `\` as a path separator.

use super::errors::ProxyError;
use std::fmt;
use std::net::SocketAddr;
use url::{Host, Url};

/// Default port for `socks*` schemes when the URL omits one
pub const DEFAULT_SOCKS_PORT: u16 = 1080;

/// Optional username/password pair attached to a proxy URL
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    /// Both halves present, as required by HTTP Basic and SOCKS5 user/pass auth
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    /// Split a raw user-info string on its first `:`
    fn from_user_info(user_info: &str) -> Self {
        match user_info.split_once(':') {
            Some((user, pass)) => Self::new(Some(user.to_string()), Some(pass.to_string())),
            None => Self::new(Some(user_info.to_string()), None),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A configured proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDescriptor {
    /// Lowercased URL scheme, e.g. `http`, `socks4a`
    pub scheme: String,
    /// Host name or IP literal (IPv6 without brackets)
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl ProxyDescriptor {
    /// Proxy URL with any credentials masked, safe for logs
    pub fn sanitized_url(&self) -> String {
        let host = bracket_ipv6(&self.host);
        if self.credentials.is_empty() {
            format!("{}://{}:{}", self.scheme, host, self.port)
        } else {
            format!("{}://***:***@{}:{}", self.scheme, host, self.port)
        }
    }

    /// Host/port pair suitable for `ToSocketAddrs`
    pub fn endpoint(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

/// Parse a proxy URL
///
/// Returns `Ok(None)` for an empty string, meaning "connect directly".
pub fn parse_proxy_url(raw: &str) -> Result<Option<ProxyDescriptor>, ProxyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| ProxyError::malformed_url(format!("missing scheme in '{raw}'")))?;
    if scheme.is_empty() {
        return Err(ProxyError::malformed_url(format!("empty scheme in '{raw}'")));
    }

    let authority_end = rest
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let (user_info, host_port) = match authority.rfind('@') {
        Some(at) => (Some(&authority[..at]), &authority[at + 1..]),
        None => (None, authority),
    };

    let url = Url::parse(&format!("{scheme}://{host_port}/"))
        .map_err(|e| ProxyError::malformed_url(format!("{e}")))?;

    let host = match url.host() {
        Some(Host::Ipv6(ip)) => ip.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Domain(domain)) => domain.to_string(),
        None => String::new(),
    };
    if host.is_empty() {
        return Err(ProxyError::malformed_url("proxy host cannot be empty"));
    }

    let scheme = url.scheme().to_ascii_lowercase();
    let port = url
        .port_or_known_default()
        .or_else(|| scheme.starts_with("socks").then_some(DEFAULT_SOCKS_PORT))
        .ok_or_else(|| {
            ProxyError::malformed_url(format!("no port given and no default for '{scheme}'"))
        })?;
    if port == 0 {
        return Err(ProxyError::malformed_url("proxy port cannot be 0"));
    }

    let credentials = user_info
        .filter(|info| !info.is_empty())
        .map(Credentials::from_user_info)
        .unwrap_or_default();

    Ok(Some(ProxyDescriptor {
        scheme,
        host,
        port,
        credentials,
    }))
}

/// The destination the caller ultimately wants to reach
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ProxyError> {
        if self.host.trim().is_empty() {
            return Err(ProxyError::invalid_argument("target host can't be empty"));
        }
        if self.port == 0 {
            return Err(ProxyError::invalid_argument("target port can't be 0"));
        }
        Ok(())
    }
}

impl From<SocketAddr> for ConnectTarget {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", bracket_ipv6(&self.host), self.port)
    }
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}
