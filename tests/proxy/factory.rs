//! Socket factory adapters

use crate::common::mock_proxy;
use crate::common::test_env::init_test_env;
use proxy_tunnel::core::proxy::{
    ProxyConnector, ProxyServerSocketFactory, ProxySocketFactory, ServerSocketFactory,
    SocketFactory,
};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::thread;

#[test]
fn test_socket_factory_tunnels_through_http_proxy() {
    init_test_env();
    let target = mock_proxy::echo_target();
    let proxy = mock_proxy::http_connect();
    let factory = ProxySocketFactory::new(Some(&proxy.url("http"))).unwrap();

    let mut stream = factory.connect("127.0.0.1", target.addr.port()).unwrap();
    stream.write_all(b"hello").unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
    drop(stream);

    proxy.join().unwrap();
    target.join().unwrap();
}

#[test]
fn test_socket_factory_connect_from() {
    init_test_env();
    let target = mock_proxy::echo_target();
    let factory = ProxySocketFactory::with_connector(ProxyConnector::new(None).unwrap());

    let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let stream = factory
        .connect_from("127.0.0.1", target.addr.port(), local)
        .unwrap();
    assert!(stream.local_addr().unwrap().ip().is_loopback());
    drop(stream);
    target.join().unwrap();
}

#[test]
fn test_socket_factory_maps_errors() {
    init_test_env();
    let proxy = mock_proxy::http_rejecting("HTTP/1.1 403 Forbidden");
    let factory = ProxySocketFactory::new(Some(&proxy.url("http"))).unwrap();

    let err = factory.connect("ftp.example.com", 21).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    assert!(err.to_string().contains("403"));
    assert!(proxy.join().unwrap());
}

#[test]
fn test_server_socket_factory_is_not_proxied() {
    init_test_env();
    let factory = ProxyServerSocketFactory;
    let listener = factory
        .bind_on(0, 8, IpAddr::V4(Ipv4Addr::LOCALHOST))
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(b"220 ready\r\n").unwrap();
    });

    let mut client = TcpStream::connect(addr).unwrap();
    let mut line = String::new();
    client.read_to_string(&mut line).unwrap();
    assert_eq!(line, "220 ready\r\n");
    server.join().unwrap();
}

#[test]
fn test_server_socket_factory_any_address() {
    let listener = ProxyServerSocketFactory.bind(0).unwrap();
    assert!(listener.local_addr().unwrap().ip().is_unspecified());

    let listener = ProxyServerSocketFactory.bind_with_backlog(0, -1).unwrap();
    assert_ne!(listener.local_addr().unwrap().port(), 0);
}
