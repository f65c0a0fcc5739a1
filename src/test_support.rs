use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread::JoinHandle;

use rusqlite::Connection;

use crate::adapters::db::{open_connection, run_migrations};

/// Opens a fully migrated scratch database. The backing tempdir is leaked on
/// purpose so the file outlives the returned connection for the whole test.
pub fn open_test_connection(name: &str) -> Connection {
    let mut connection = open_connection(temp_db_path(name).to_string_lossy().as_ref())
        .expect("test db should open");
    run_migrations(&mut connection).expect("test migrations should succeed");
    connection
}

fn temp_db_path(name: &str) -> PathBuf {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join(name);
    std::mem::forget(dir);
    path
}

/// One-shot HTTP responder on a local port; answers a single request with
/// the given status and body and hands the raw request text back on join.
pub struct StubHttpServer {
    pub base_url: String,
    handle: JoinHandle<String>,
}

impl StubHttpServer {
    pub fn spawn(status: u16, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("stub listener should bind");
        let port = listener
            .local_addr()
            .expect("stub addr should be available")
            .port();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("stub accept should succeed");
            let request = read_http_request(&mut stream);

            let reason = match status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                _ => "Status",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("stub response should be written");

            request
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            handle,
        }
    }

    pub fn captured_request(self) -> String {
        self.handle.join().expect("stub thread should terminate")
    }
}

fn read_http_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buffer = [0_u8; 4096];

    let header_end = loop {
        let size = stream.read(&mut buffer).expect("stub read should succeed");
        raw.extend_from_slice(&buffer[..size]);
        if let Some(position) = find_header_end(&raw) {
            break position;
        }
        assert!(size > 0, "connection closed before headers completed");
    };

    let headers = String::from_utf8_lossy(&raw[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while raw.len() < header_end + 4 + content_length {
        let size = stream.read(&mut buffer).expect("stub read should succeed");
        assert!(size > 0, "connection closed before body completed");
        raw.extend_from_slice(&buffer[..size]);
    }

    String::from_utf8_lossy(&raw).into_owned()
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}
