//! Async TCP server using Tokio.
//!
//! Accepts connections and feeds parsed HTTP/1.1 requests through the
//! application [`Router`]. Connections are persistent: each one is served by
//! its own task, one request per loop iteration, until the peer closes or
//! sends `Connection: close`.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use serde_json::json;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{Request, RequestError, Response, StatusCode};
use crate::router::Router;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Cap on a buffered request (1 MiB). The API only ever receives small JSON
/// payloads.
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The MarketPulse HTTP server.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds to `addr`.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address cannot be bound (port in use,
    /// insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and dispatches requests through `router` until the
    /// process is terminated or the listener fails.
    ///
    /// # Errors
    ///
    /// [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, router: Router) -> Result<(), ServerError> {
        let router = Arc::new(router);
        info!(address = %self.local_addr, "accepting connections");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    error!(error = %err, "accept failed");
                    continue;
                }
            };

            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let mut conn = Connection::new(stream, peer);
                if let Err(err) = conn.serve(router.as_ref()).await {
                    warn!(peer = %peer, error = %err, "connection closed with error");
                }
            });
        }
    }
}

/// One accepted TCP connection and its read buffer.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
}

/// Outcome of waiting for the next request on a connection.
enum Fetched {
    /// A complete request plus the number of buffered bytes it consumed.
    Request(Request, usize),
    /// The peer is gone or the request was rejected; stop serving.
    Done,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(INITIAL_BUF_SIZE),
        }
    }

    async fn serve(&mut self, router: &Router) -> Result<(), std::io::Error> {
        loop {
            let (request, consumed) = match self.fetch_request().await? {
                Fetched::Request(request, consumed) => (request, consumed),
                Fetched::Done => return Ok(()),
            };

            let keep_alive = request.is_keep_alive();
            debug!(
                peer = %self.peer,
                method = %request.method(),
                path = %request.path(),
                "request dispatched"
            );

            let response = router.dispatch(request).await.keep_alive(keep_alive);
            self.stream.write_all(&response.into_bytes()).await?;
            self.stream.flush().await?;

            let _ = self.buf.split_to(consumed);

            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Reads until one complete request (headers and declared body) is
    /// buffered. Protocol violations are answered on the spot and close the
    /// connection.
    async fn fetch_request(&mut self) -> Result<Fetched, std::io::Error> {
        loop {
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                debug!(peer = %self.peer, "peer closed the connection");
                return Ok(Fetched::Done);
            }

            if self.buf.len() > MAX_REQUEST_SIZE {
                warn!(peer = %self.peer, "request exceeds size cap");
                self.reject(StatusCode::PayloadTooLarge, "Request entity too large")
                    .await?;
                return Ok(Fetched::Done);
            }

            let (request, body_offset) = match Request::parse(&self.buf) {
                Ok(pair) => pair,
                Err(RequestError::Incomplete) => continue,
                Err(err) => {
                    warn!(peer = %self.peer, error = %err, "unparseable request");
                    self.reject(StatusCode::BadRequest, "Bad Request").await?;
                    return Ok(Fetched::Done);
                }
            };

            // Re-parse on the next read until the declared body has arrived.
            let consumed = body_offset + request.content_length().unwrap_or(0);
            if self.buf.len() < consumed {
                continue;
            }

            return Ok(Fetched::Request(request, consumed));
        }
    }

    async fn reject(&mut self, status: StatusCode, message: &str) -> Result<(), std::io::Error> {
        let response = Response::json(status, &json!({"success": false, "message": message}))
            .keep_alive(false);
        self.stream.write_all(&response.into_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use crate::http::Response;

    use super::*;

    async fn spawn_server() -> SocketAddr {
        let mut router = Router::new();
        router.get("/ping", |_req, _params| async {
            Response::new(StatusCode::Ok).body("pong")
        });

        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve(router));
        addr
    }

    async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn serves_a_request_end_to_end() {
        let addr = spawn_server().await;
        let response = roundtrip(
            addr,
            "GET /ping HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("pong"));
    }

    #[tokio::test]
    async fn unroutable_path_gets_json_404() {
        let addr = spawn_server().await;
        let response = roundtrip(
            addr,
            "GET /nope HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.contains(r#""success":false"#));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let addr = spawn_server().await;
        let response = roundtrip(addr, "NOT AN HTTP REQUEST\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn keep_alive_serves_two_requests_on_one_connection() {
        let addr = spawn_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        for _ in 0..2 {
            stream
                .write_all(b"GET /ping HTTP/1.1\r\nHost: test\r\n\r\n")
                .await
                .unwrap();
            let mut chunk = vec![0u8; 1024];
            let n = stream.read(&mut chunk).await.unwrap();
            let text = String::from_utf8_lossy(&chunk[..n]).into_owned();
            assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(text.ends_with("pong"));
        }
    }
}
