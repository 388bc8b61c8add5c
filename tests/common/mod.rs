//! Shared helpers for integration tests.
//!
//! Each integration test binary uses its own subset of these.
#![allow(dead_code)]

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected TCP pair on the loopback interface.
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

/// Read bytes until `count` instruction terminators have been seen.
///
/// Only suitable for frames whose payloads contain no literal `;`.
pub async fn read_frames(stream: &mut TcpStream, count: usize) -> String {
    let mut out = Vec::new();
    let mut seen = 0;
    let mut byte = [0u8; 1];
    while seen < count {
        tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut byte))
            .await
            .expect("timed out waiting for a frame")
            .unwrap();
        if byte[0] == b';' {
            seen += 1;
        }
        out.push(byte[0]);
    }
    String::from_utf8(out).unwrap()
}

/// Read exactly `len` bytes as UTF-8.
pub async fn read_exact_string(stream: &mut TcpStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for wire bytes")
        .unwrap();
    String::from_utf8(buf).unwrap()
}

/// Assert that nothing arrives on `stream` within a short grace period.
pub async fn assert_no_bytes(stream: &mut TcpStream) {
    let mut buf = [0u8; 1];
    let outcome =
        tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
    assert!(outcome.is_err(), "unexpected bytes on the wire");
}
