//! Single-connection mock proxies bound to 127.0.0.1

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct MockServer<T> {
    pub addr: SocketAddr,
    handle: JoinHandle<io::Result<T>>,
}

impl<T> MockServer<T> {
    pub fn url(&self, scheme: &str) -> String {
        format!("{scheme}://{}", self.addr)
    }

    pub fn url_with_user(&self, scheme: &str, user_info: &str) -> String {
        format!("{scheme}://{user_info}@{}", self.addr)
    }

    pub fn join(self) -> io::Result<T> {
        self.handle.join().expect("mock server thread panicked")
    }
}

/// Accept one connection and hand it to `f`
pub fn serve_once<T, F>(f: F) -> MockServer<T>
where
    T: Send + 'static,
    F: FnOnce(TcpStream) -> io::Result<T> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock listener");
    let addr = listener.local_addr().expect("mock listener addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept()?;
        f(stream)
    });
    MockServer { addr, handle }
}

/// Target that echoes everything until the client half-closes
pub fn echo_target() -> MockServer<usize> {
    serve_once(|stream| {
        let mut reader = stream.try_clone()?;
        let mut writer = stream;
        let n = io::copy(&mut reader, &mut writer)?;
        writer.shutdown(Shutdown::Write)?;
        Ok(n as usize)
    })
}

/// Pump bytes both ways until each side has closed
pub fn relay(client: TcpStream, upstream: TcpStream) -> io::Result<()> {
    let mut client_read = client.try_clone()?;
    let mut upstream_write = upstream.try_clone()?;
    let forward = thread::spawn(move || {
        let _ = io::copy(&mut client_read, &mut upstream_write);
        let _ = upstream_write.shutdown(Shutdown::Write);
    });
    let (mut upstream_read, mut client_write) = (upstream, client);
    let _ = io::copy(&mut upstream_read, &mut client_write);
    let _ = client_write.shutdown(Shutdown::Write);
    let _ = forward.join();
    Ok(())
}

/// Block until the peer closes; false if it never did within the timeout
pub fn wait_for_close(mut stream: TcpStream, timeout: Duration) -> bool {
    let _ = stream.set_read_timeout(Some(timeout));
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return true,
            Err(_) => return false,
        }
    }
}

/// Read one line byte by byte so nothing after it is consumed
pub fn read_line(stream: &mut TcpStream) -> io::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if stream.read(&mut byte)? == 0 || byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn read_cstr(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte)?;
        if byte[0] == 0 {
            return Ok(out);
        }
        out.push(byte[0]);
    }
}

fn split_host_port(raw: &str) -> (String, u16) {
    let (host, port) = raw.rsplit_once(':').expect("host:port");
    let host = host.trim_start_matches('[').trim_end_matches(']');
    (host.to_string(), port.parse().expect("port"))
}

/// HTTP proxy that accepts CONNECT and returns the request lines it saw
pub fn http_connect() -> MockServer<Vec<String>> {
    serve_once(|mut stream| {
        let mut lines = Vec::new();
        loop {
            let line = read_line(&mut stream)?;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        let authority = lines[0]
            .strip_prefix("CONNECT ")
            .and_then(|rest| rest.split(' ').next())
            .expect("CONNECT request line")
            .to_string();
        let (host, port) = split_host_port(&authority);
        let upstream = TcpStream::connect((host.as_str(), port))?;
        stream.write_all(b"HTTP/1.1 200 Connection established\r\nVia: mock\r\n\r\n")?;
        relay(stream, upstream)?;
        Ok(lines)
    })
}

/// HTTP proxy answering every CONNECT with `status_line`; reports whether
/// the client closed the connection afterwards
pub fn http_rejecting(status_line: &'static str) -> MockServer<bool> {
    serve_once(move |mut stream| {
        while !read_line(&mut stream)?.is_empty() {}
        stream.write_all(format!("{status_line}\r\nContent-Length: 0\r\n\r\n").as_bytes())?;
        Ok(wait_for_close(stream, Duration::from_secs(5)))
    })
}

/// SOCKS5 proxy, optionally requiring user/pass authentication
pub fn socks5(auth: Option<(&'static str, &'static str)>) -> MockServer<String> {
    serve_once(move |mut stream| {
        let mut head = [0u8; 2];
        stream.read_exact(&mut head)?;
        let mut methods = vec![0u8; head[1] as usize];
        stream.read_exact(&mut methods)?;

        match auth {
            Some((user, pass)) => {
                if !methods.contains(&0x02) {
                    stream.write_all(&[0x05, 0xFF])?;
                    return Ok(String::new());
                }
                stream.write_all(&[0x05, 0x02])?;
                let mut ver_len = [0u8; 2];
                stream.read_exact(&mut ver_len)?;
                let mut got_user = vec![0u8; ver_len[1] as usize];
                stream.read_exact(&mut got_user)?;
                let mut plen = [0u8; 1];
                stream.read_exact(&mut plen)?;
                let mut got_pass = vec![0u8; plen[0] as usize];
                stream.read_exact(&mut got_pass)?;
                if got_user != user.as_bytes() || got_pass != pass.as_bytes() {
                    stream.write_all(&[0x01, 0x01])?;
                    return Ok(String::new());
                }
                stream.write_all(&[0x01, 0x00])?;
            }
            None => stream.write_all(&[0x05, 0x00])?,
        }

        let mut req = [0u8; 4];
        stream.read_exact(&mut req)?;
        assert_eq!(req[..3], [0x05, 0x01, 0x00]);
        assert_eq!(req[3], 0x03, "client always sends a domain name");
        let mut len = [0u8; 1];
        stream.read_exact(&mut len)?;
        let mut host = vec![0u8; len[0] as usize];
        stream.read_exact(&mut host)?;
        let mut port = [0u8; 2];
        stream.read_exact(&mut port)?;
        let host = String::from_utf8_lossy(&host).into_owned();

        let upstream = TcpStream::connect((host.as_str(), u16::from_be_bytes(port)))?;
        // Bound address as IPv6 to exercise the variable-length skip
        let mut reply = vec![0x05, 0x00, 0x00, 0x04];
        reply.extend_from_slice(&[0u8; 16]);
        reply.extend_from_slice(&[0x00, 0x00]);
        stream.write_all(&reply)?;
        relay(stream, upstream)?;
        Ok(host)
    })
}

/// SOCKS5 proxy that refuses every CONNECT with `code`
pub fn socks5_rejecting(code: u8) -> MockServer<bool> {
    serve_once(move |mut stream| {
        let mut greeting = [0u8; 3];
        stream.read_exact(&mut greeting)?;
        stream.write_all(&[0x05, 0x00])?;
        let mut req = [0u8; 5];
        stream.read_exact(&mut req)?;
        let mut rest = vec![0u8; req[4] as usize + 2];
        stream.read_exact(&mut rest)?;
        stream.write_all(&[0x05, code, 0x00, 0x01, 0, 0, 0, 0, 0, 0])?;
        Ok(wait_for_close(stream, Duration::from_secs(5)))
    })
}

/// SOCKS4/4a proxy; returns the user id from the request
pub fn socks4() -> MockServer<String> {
    serve_once(|mut stream| {
        let mut head = [0u8; 8];
        stream.read_exact(&mut head)?;
        assert_eq!(head[..2], [0x04, 0x01]);
        let port = u16::from_be_bytes([head[2], head[3]]);
        let user = String::from_utf8_lossy(&read_cstr(&mut stream)?).into_owned();
        let host = if head[4..8] == [0, 0, 0, 1] {
            String::from_utf8_lossy(&read_cstr(&mut stream)?).into_owned()
        } else {
            format!("{}.{}.{}.{}", head[4], head[5], head[6], head[7])
        };
        let upstream = TcpStream::connect((host.as_str(), port))?;
        stream.write_all(&[0x00, 0x5A, 0, 0, 0, 0, 0, 0])?;
        relay(stream, upstream)?;
        Ok(user)
    })
}

/// SOCKS4 proxy answering every request with status `code`; reports whether
/// the client closed the connection afterwards
pub fn socks4_rejecting(code: u8) -> MockServer<bool> {
    serve_once(move |mut stream| {
        let mut head = [0u8; 8];
        stream.read_exact(&mut head)?;
        read_cstr(&mut stream)?;
        if head[4..8] == [0, 0, 0, 1] {
            read_cstr(&mut stream)?;
        }
        stream.write_all(&[0x00, code, 0, 0, 0, 0, 0, 0])?;
        Ok(wait_for_close(stream, Duration::from_secs(5)))
    })
}

/// FTP relay that refuses the login with `530`; reports whether the client
/// closed the connection afterwards
pub fn ftp_relay_rejecting_login() -> MockServer<bool> {
    serve_once(|mut stream| {
        stream.write_all(b"220 Relay ready\r\n")?;
        let line = read_line(&mut stream)?;
        assert!(line.starts_with("USER "), "unexpected command: {line}");
        stream.write_all(b"530 Login incorrect\r\n")?;
        Ok(wait_for_close(stream, Duration::from_secs(5)))
    })
}

/// FTP relay requiring USER/PASS, then SITE host:port; returns the commands
pub fn ftp_relay() -> MockServer<Vec<String>> {
    serve_once(|mut stream| {
        let mut commands = Vec::new();
        stream.write_all(b"220-Relay ready\r\n220 Go ahead\r\n")?;
        loop {
            let line = read_line(&mut stream)?;
            commands.push(line.clone());
            if line.starts_with("USER ") {
                stream.write_all(b"331 Password required\r\n")?;
            } else if line.starts_with("PASS ") {
                stream.write_all(b"230 Logged in\r\n")?;
            } else if let Some(authority) = line
                .strip_prefix("SITE ")
                .or_else(|| line.strip_prefix("OPEN "))
            {
                let (host, port) = split_host_port(authority);
                let upstream = TcpStream::connect((host.as_str(), port))?;
                stream.write_all(b"200 Connected\r\n")?;
                relay(stream, upstream)?;
                return Ok(commands);
            } else {
                stream.write_all(b"500 Unknown command\r\n")?;
                return Ok(commands);
            }
        }
    })
}

/// Proxy that accepts and never answers; reports whether the client closed
pub fn silent(patience: Duration) -> MockServer<bool> {
    serve_once(move |stream| Ok(wait_for_close(stream, patience)))
}
