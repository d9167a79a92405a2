//! Minimal sync HTTP/1.1 over stdlib TcpStream. Plain HTTP only — both
//! peers (Ollama, local search proxy) are loopback services. JSON/HTML
//! bodies returned raw; status handling is the caller's problem.

use anyhow::{bail, Result};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

fn connect(host: &str, timeout: Duration) -> Result<TcpStream> {
    let addr: SocketAddr = match host.parse() {
        Ok(addr) => addr,
        // allow "localhost:11434" style hosts
        Err(_) => host
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("Cannot resolve host: {host}"))?,
    };
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

fn read_body(mut stream: TcpStream) -> Result<String> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    match response.find("\r\n\r\n") {
        Some(pos) => Ok(response[pos + 4..].to_string()),
        None => bail!("Malformed HTTP response (no header separator)"),
    }
}

pub fn post(host: &str, path: &str, body: &str, timeout_ms: u64) -> Result<String> {
    let mut stream = connect(host, Duration::from_millis(timeout_ms))?;
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {host}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        len = body.len(),
    );
    stream.write_all(request.as_bytes())?;
    read_body(stream)
}

pub fn get(host: &str, path: &str, timeout_ms: u64) -> Result<String> {
    let mut stream = connect(host, Duration::from_millis(timeout_ms))?;
    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: Mozilla/5.0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;
    read_body(stream)
}
