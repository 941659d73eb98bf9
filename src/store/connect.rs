//! Connect primitive for the backing document store.
//!
//! The wire protocol above the socket belongs to the store driver; this module
//! ends at a ready, pooled link. [`Connector`] is the seam
//! [`ConnectionCache`](super::ConnectionCache) dials through, so tests and
//! alternative drivers can swap the transport without touching the cache.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

use super::StoreHandle;

/// URI scheme accepted for store addresses,
/// e.g. `docstore://db.internal:7171/marketpulse`.
pub const URI_SCHEME: &str = "docstore://";

/// Port assumed when the store address does not carry one.
const DEFAULT_PORT: u16 = 7171;

/// Errors produced while establishing a store link.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid store address `{uri}`: {reason}")]
    Address { uri: String, reason: &'static str },

    #[error("I/O error reaching {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {address} after {waited:?}")]
    Timeout { address: String, waited: Duration },

    #[error("store rejected the connection: {reason}")]
    Rejected { reason: String },
}

/// Options forwarded to the connect primitive.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Buffer writes inside the driver instead of failing fast. Kept `false`
    /// so store problems surface to the caller immediately rather than
    /// queueing silently.
    pub buffer_writes: bool,

    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            buffer_writes: false,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Async connect primitive supplied by the database collaborator.
///
/// Implementations establish a *fresh* link on every call; reuse and
/// de-duplication are the cache's job, not the connector's.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a new link to the store at `uri`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] when the address cannot be parsed, the
    /// transport cannot be opened, or the store turns the connection away.
    async fn connect(
        &self,
        uri: &str,
        options: &ConnectOptions,
    ) -> Result<StoreHandle, ConnectError>;
}

/// Production connector — opens the TCP link to the configured address.
///
/// `buffer_writes: false` maps to `TCP_NODELAY`: writes leave the process as
/// soon as they are issued, so a dead link fails the calling request instead
/// of parking bytes in a kernel buffer.
#[derive(Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        uri: &str,
        options: &ConnectOptions,
    ) -> Result<StoreHandle, ConnectError> {
        let address = socket_address(uri)?;

        let stream = match tokio::time::timeout(
            options.connect_timeout,
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ConnectError::Io { address, source }),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    address,
                    waited: options.connect_timeout,
                });
            }
        };

        if !options.buffer_writes {
            stream
                .set_nodelay(true)
                .map_err(|source| ConnectError::Io {
                    address: address.clone(),
                    source,
                })?;
        }

        debug!(address = %address, "store link established");
        Ok(StoreHandle::with_socket(uri.to_owned(), stream))
    }
}

/// Extracts `host:port` from a store URI, applying [`DEFAULT_PORT`] when the
/// address carries none.
fn socket_address(uri: &str) -> Result<String, ConnectError> {
    let rest = uri
        .strip_prefix(URI_SCHEME)
        .ok_or_else(|| ConnectError::Address {
            uri: uri.to_owned(),
            reason: "unsupported scheme",
        })?;

    let authority = rest.split('/').next().unwrap_or("");
    if authority.is_empty() {
        return Err(ConnectError::Address {
            uri: uri.to_owned(),
            reason: "missing host",
        });
    }

    Ok(if authority.contains(':') {
        authority.to_owned()
    } else {
        format!("{authority}:{DEFAULT_PORT}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_with_explicit_port() {
        let addr = socket_address("docstore://db.internal:9001/app").unwrap();
        assert_eq!(addr, "db.internal:9001");
    }

    #[test]
    fn socket_address_applies_default_port() {
        let addr = socket_address("docstore://db.internal/app").unwrap();
        assert_eq!(addr, "db.internal:7171");
    }

    #[test]
    fn socket_address_rejects_foreign_scheme() {
        let err = socket_address("postgres://db.internal/app").unwrap_err();
        assert!(matches!(err, ConnectError::Address { .. }));
    }

    #[test]
    fn socket_address_rejects_missing_host() {
        let err = socket_address("docstore:///app").unwrap_err();
        assert!(matches!(err, ConnectError::Address { .. }));
    }

    #[tokio::test]
    async fn tcp_connector_reaches_a_listening_store() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let uri = format!("docstore://127.0.0.1:{port}/app");

        let handle = TcpConnector
            .connect(&uri, &ConnectOptions::default())
            .await
            .unwrap();

        assert_eq!(handle.address(), uri);
        assert!(handle.owns_socket());
    }

    #[tokio::test]
    async fn tcp_connector_surfaces_refused_connections() {
        // Bind then drop to find a port with nothing listening on it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let uri = format!("docstore://127.0.0.1:{port}/app");
        let err = TcpConnector
            .connect(&uri, &ConnectOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectError::Io { .. }));
    }
}
