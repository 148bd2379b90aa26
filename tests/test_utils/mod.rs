//! Shared helpers for integration tests: a minimal mock HTTP server
//! that captures requests and replies with a scripted status sequence.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use logship::{Envelope, Level, ShipperConfig};

/// Config pointed at a test endpoint with backoff shrunk so retry
/// cycles complete quickly.
pub fn test_config(endpoint: &str, root: &Path) -> ShipperConfig {
    ShipperConfig {
        service: "billing".into(),
        endpoint: endpoint.to_owned(),
        signing_secret: "test-secret".into(),
        default_level: Level::Debug,
        api_timeout: Duration::from_secs(2),
        buffer_root: root.to_owned(),
        stdout_mirror: false,
        max_retries: 5,
        max_backoff: Duration::from_millis(10),
    }
}

#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn parse_header_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.split_once(':')
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
}

fn read_http_request(stream: &mut TcpStream) -> CapturedRequest {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .expect("read request line");
    let mut parts = request_line.trim().split(' ');
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = parse_header_line(&line) else {
            continue;
        };
        if key == "content-length" {
            content_length = value.parse().unwrap_or(0);
        }
        headers.push((key, value));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).expect("read body");
    }

    CapturedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

/// Serve the scripted statuses in order, one connection per request,
/// capturing each request. The server stops once the script runs out.
pub fn spawn_server(
    listener: TcpListener,
    statuses: Vec<u16>,
) -> (SocketAddr, mpsc::Receiver<CapturedRequest>) {
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for status in statuses {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let captured = read_http_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status,
                status_text(status)
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = tx.send(captured);
        }
    });

    (addr, rx)
}

pub fn ephemeral_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

/// An endpoint URL nothing is listening on: connections are refused
/// immediately.
pub fn unreachable_endpoint() -> String {
    let listener = ephemeral_listener();
    let addr = listener.local_addr().expect("listener has address");
    drop(listener);
    format!("http://{addr}/log")
}

/// Parse every envelope currently pending in a service's buffer
/// directory (active, rotated and sending files).
pub fn pending_envelopes(service_dir: &Path) -> Vec<Envelope> {
    let mut envelopes = Vec::new();
    let Ok(entries) = std::fs::read_dir(service_dir) else {
        return envelopes;
    };
    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(".jsonl"))
        })
        .collect();
    paths.sort();
    for path in paths {
        let contents = std::fs::read_to_string(&path).expect("read buffer file");
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            envelopes.push(serde_json::from_str(line).expect("parse buffer line"));
        }
    }
    envelopes
}
