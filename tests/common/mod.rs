#![allow(dead_code)]
//! Shared test support: logging init and loopback mock proxies
//!
//! Every mock serves exactly one connection on its own thread and relays
//! bytes to the requested target once the handshake is done.

pub mod mock_proxy;
pub mod test_env;
