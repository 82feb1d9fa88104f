//! Connectivity probe
//!
//! Opens one tunneled connection with the settings taken from the
//! environment and reports how it went. Used by the `proxy-probe` binary to
//! check a proxy before pointing a client at it.

use crate::core::proxy::{ConnectTarget, ProxyConfig, ProxyConnector};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

pub const ENV_URL: &str = "PROXY_PROBE_URL";
pub const ENV_TARGET: &str = "PROXY_PROBE_TARGET";
pub const ENV_TIMEOUT_MS: &str = "PROXY_PROBE_TIMEOUT_MS";
pub const ENV_CONFIG: &str = "PROXY_PROBE_CONFIG";

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub config: ProxyConfig,
    pub target: ConnectTarget,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub proxy: String,
    pub strategy: &'static str,
    pub target: String,
    pub elapsed_ms: u128,
    pub local_addr: Option<String>,
    pub peer_addr: Option<String>,
}

/// Split `host:port`, accepting a bracketed IPv6 host
pub fn parse_target(raw: &str) -> Result<ConnectTarget> {
    let raw = raw.trim();
    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        rest.split_once("]:")
            .ok_or_else(|| anyhow!("invalid target '{raw}', expected [host]:port"))?
    } else {
        raw.rsplit_once(':')
            .ok_or_else(|| anyhow!("invalid target '{raw}', expected host:port"))?
    };
    if host.is_empty() {
        return Err(anyhow!("invalid target '{raw}': empty host"));
    }
    let port = port
        .parse::<u16>()
        .with_context(|| format!("invalid target port in '{raw}'"))?;
    Ok(ConnectTarget::new(host, port))
}

pub fn run_from_env() -> Result<ProbeReport> {
    let mut config = match std::env::var(ENV_CONFIG).ok().filter(|p| !p.trim().is_empty()) {
        Some(path) => ProxyConfig::load_from_path(&PathBuf::from(path.trim()))?,
        None => ProxyConfig::default(),
    };
    if let Ok(url) = std::env::var(ENV_URL) {
        config.url = Some(url);
    }
    if let Some(ms) = std::env::var(ENV_TIMEOUT_MS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        config.connect_timeout_ms = ms;
    }
    config.validate()?;

    let raw_target =
        std::env::var(ENV_TARGET).map_err(|_| anyhow!("{ENV_TARGET} is required (host:port)"))?;
    let target = parse_target(&raw_target)?;

    run(ProbeOptions { config, target })
}

pub fn run(opts: ProbeOptions) -> Result<ProbeReport> {
    let connector = ProxyConnector::from_config(&opts.config)?;
    let strategy = connector.strategy().name();
    tracing::info!(
        proxy.type = strategy,
        proxy.url = %opts.config.sanitized_url(),
        target.host = %opts.target.host,
        target.port = opts.target.port,
        "Probing connection"
    );

    let start = Instant::now();
    let mut socket = connector.create_socket();
    socket
        .connect(&opts.target, connector.connect_timeout())
        .with_context(|| format!("connect to {} via {strategy}", opts.target))?;
    let elapsed_ms = start.elapsed().as_millis();

    let report = ProbeReport {
        proxy: opts.config.sanitized_url(),
        strategy,
        target: opts.target.to_string(),
        elapsed_ms,
        local_addr: socket.local_addr().ok().map(|a| a.to_string()),
        peer_addr: socket.peer_addr().ok().map(|a| a.to_string()),
    };
    socket.close();
    Ok(report)
}
