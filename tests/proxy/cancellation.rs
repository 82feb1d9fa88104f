//! Closing a socket from another thread

use crate::common::mock_proxy;
use crate::common::test_env::init_test_env;
use proxy_tunnel::core::proxy::{ConnectTarget, ProxyConnector, ProxyError};
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_closer_interrupts_handshake() {
    init_test_env();
    let proxy = mock_proxy::silent(Duration::from_secs(20));
    // No handshake timeout of its own; falls back to the 10s connect timeout
    let connector = ProxyConnector::new(Some(&proxy.url("socks5")))
        .unwrap()
        .with_timeouts(Some(Duration::from_secs(10)), None);

    let mut socket = connector.create_socket();
    let closer = socket.closer();
    let start = Instant::now();
    let worker = thread::spawn(move || {
        let result = socket.connect(&ConnectTarget::new("ftp.example.com", 21), None);
        (result, socket.is_closed())
    });

    thread::sleep(Duration::from_millis(300));
    closer.close();
    assert!(closer.is_closed());

    let (result, closed) = worker.join().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(result.is_err());
    assert!(closed);
    assert!(proxy.join().unwrap());
}

#[test]
fn test_closer_before_connect_prevents_connect() {
    init_test_env();
    let connector = ProxyConnector::new(None).unwrap();
    let mut socket = connector.create_socket();
    socket.closer().close();

    let err = socket
        .connect(&ConnectTarget::new("127.0.0.1", 21), None)
        .unwrap_err();
    assert!(matches!(err, ProxyError::IllegalState(_)));
}

#[test]
fn test_closer_interrupts_established_read() {
    init_test_env();
    let target = mock_proxy::echo_target();
    let proxy = mock_proxy::socks5(None);
    let connector = ProxyConnector::new(Some(&proxy.url("socks5"))).unwrap();

    let mut socket = connector.connect("127.0.0.1", target.addr.port()).unwrap();
    let closer = socket.closer();
    let worker = thread::spawn(move || {
        let mut buf = [0u8; 16];
        // Nothing was sent, so this blocks until the close
        socket.read(&mut buf)
    });

    thread::sleep(Duration::from_millis(200));
    closer.close();
    // Either an error or end-of-stream, but never a hang
    if let Ok(n) = worker.join().unwrap() {
        assert_eq!(n, 0);
    }

    proxy.join().unwrap();
    target.join().unwrap();
}
