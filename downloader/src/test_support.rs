/// Mock peers for download tests.
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// An `AsyncRead` that hands out pre-recorded chunks, one per read call,
/// then reports end of stream (or an error, if one was scripted).
pub struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    error: Option<io::ErrorKind>,
}

impl ScriptedStream {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            error: None,
        }
    }

    /// Fail with `kind` once the chunks run out instead of returning EOF.
    pub fn then_error(mut self, kind: io::ErrorKind) -> Self {
        self.error = Some(kind);
        self
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.chunks.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    let rest = chunk.split_off(n);
                    self.chunks.push_front(rest);
                }
                Poll::Ready(Ok(()))
            }
            None => match self.error.take() {
                Some(kind) => Poll::Ready(Err(io::Error::from(kind))),
                None => Poll::Ready(Ok(())),
            },
        }
    }
}

/// A one-shot HTTP peer listening on localhost.
pub struct MockServer {
    pub addr: SocketAddr,
    /// Request bytes the client sent, up to and including the blank line.
    pub request: JoinHandle<Vec<u8>>,
}

/// Read a request head from `socket`.
async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => request.push(byte[0]),
        }
    }
    request
}

/// Accept one connection, read its request, then write `chunks` with a
/// flush and `gap` pause after each, and close.
pub async fn serve_chunks(chunks: Vec<Vec<u8>>, gap: Duration) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let request = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        for chunk in chunks {
            socket.write_all(&chunk).await.unwrap();
            socket.flush().await.unwrap();
            if !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }
        }
        let _ = socket.shutdown().await;
        request
    });

    MockServer { addr, request }
}

/// Accept one connection and say nothing until `release` fires, then close.
pub async fn serve_silent(release: oneshot::Receiver<()>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let request = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let _ = release.await;
        let _ = socket.shutdown().await;
        request
    });

    MockServer { addr, request }
}

/// Wrap a body in a minimal response with a matching `Content-Length`.
pub fn response_with_body(body: &[u8]) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    response.extend_from_slice(body);
    response
}
