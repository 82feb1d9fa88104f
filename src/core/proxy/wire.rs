//! Byte-level helpers shared by the handshake implementations
//!
//! Every read goes straight to the underlying stream without buffering so a
//! handshake never consumes bytes that belong to the tunneled session.

use super::errors::ProxyError;
use std::io::{self, Read, Write};

/// Longest response line accepted from a text-based proxy
const MAX_LINE_LEN: usize = 8 * 1024;

/// Most lines accepted in one HTTP response head or FTP reply
pub(crate) const MAX_RESPONSE_LINES: usize = 128;

fn map_read_error(e: io::Error) -> ProxyError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ProxyError::closed_by_proxy()
    } else {
        ProxyError::Transport(e)
    }
}

pub(crate) fn read_u8<S: Read>(stream: &mut S) -> Result<u8, ProxyError> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).map_err(map_read_error)?;
    Ok(byte[0])
}

/// Discard exactly `n` bytes
pub(crate) fn skip<S: Read>(stream: &mut S, n: usize) -> Result<(), ProxyError> {
    let copied = io::copy(&mut stream.by_ref().take(n as u64), &mut io::sink())
        .map_err(ProxyError::Transport)?;
    if copied < n as u64 {
        return Err(ProxyError::closed_by_proxy());
    }
    Ok(())
}

/// Read one line terminated by `\n`, with any trailing `\r` removed.
///
/// Returns `Ok(None)` on end-of-stream before any byte of the line arrived.
pub(crate) fn read_line<S: Read>(stream: &mut S) -> Result<Option<String>, ProxyError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = loop {
            match stream.read(&mut byte) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProxyError::Transport(e)),
            }
        };
        if n == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() > MAX_LINE_LEN {
            return Err(ProxyError::invalid_response("response line too long"));
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Append `line` to a multi-line response, failing once it grows past
/// [`MAX_RESPONSE_LINES`]
pub(crate) fn push_response_line(lines: &mut Vec<String>, line: String) -> Result<(), ProxyError> {
    if lines.len() >= MAX_RESPONSE_LINES {
        return Err(ProxyError::invalid_response(format!(
            "response exceeds {MAX_RESPONSE_LINES} lines"
        )));
    }
    lines.push(line);
    Ok(())
}

pub(crate) fn send<S: Write>(stream: &mut S, bytes: &[u8]) -> Result<(), ProxyError> {
    stream.write_all(bytes).map_err(ProxyError::Transport)?;
    stream.flush().map_err(ProxyError::Transport)
}

/// Append a one-byte length prefix followed by `bytes`
pub(crate) fn push_len_prefixed(
    buf: &mut Vec<u8>,
    bytes: &[u8],
    what: &'static str,
) -> Result<(), ProxyError> {
    let len = u8::try_from(bytes.len()).map_err(|_| ProxyError::TooLong(what))?;
    buf.push(len);
    buf.extend_from_slice(bytes);
    Ok(())
}
