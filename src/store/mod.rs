//! Store access layer — memoized connections to the backing document store.
//!
//! Request handlers never dial the store themselves. They go through
//! [`ConnectionCache::acquire`], which establishes the link on first use and
//! hands every later caller a clone of the same pooled handle. Concurrent
//! callers racing on a cold cache share one in-flight attempt instead of each
//! opening a connection, and a failed attempt is purged so the next call
//! retries cleanly.
//!
//! The cache is an explicit instance owned by the application state, not a
//! process global — tests build as many isolated caches as they like.

pub mod connect;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::info;

pub use connect::{ConnectError, ConnectOptions, Connector, TcpConnector, URI_SCHEME};

/// Errors surfaced by [`ConnectionCache::acquire`].
///
/// `Config` is fatal until the deployment is fixed: the connect primitive is
/// never invoked and cache state is untouched. `Connection` is transient: the
/// pending attempt was purged, so the next call starts over.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store configuration error: {reason}")]
    Config { reason: String },

    #[error("failed to connect to backing store: {0}")]
    Connection(#[from] Arc<ConnectError>),
}

/// Opaque handle to a usable, pooled link to the backing store.
///
/// Clones are cheap and refer to the same underlying link;
/// [`same_instance`](StoreHandle::same_instance) makes that observable.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    address: String,
    /// Keeps the socket alive for connectors that own one. Handles minted by
    /// out-of-process pools carry no socket.
    socket: Option<TcpStream>,
}

impl StoreHandle {
    /// Wraps a link whose transport is pooled outside this process.
    pub fn pooled(address: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                address: address.into(),
                socket: None,
            }),
        }
    }

    pub(crate) fn with_socket(address: String, socket: TcpStream) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                address,
                socket: Some(socket),
            }),
        }
    }

    /// The store URI this handle is connected to.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Returns `true` when both handles refer to the same underlying link.
    pub fn same_instance(&self, other: &StoreHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` when this handle owns its transport socket.
    pub fn owns_socket(&self) -> bool {
        self.inner.socket.is_some()
    }
}

/// One connect attempt, awaited by every caller that arrived while it was
/// outstanding. The error is `Arc`-wrapped so all co-waiters clone the same
/// cause.
type SharedAttempt = Shared<BoxFuture<'static, Result<StoreHandle, Arc<ConnectError>>>>;

#[derive(Default)]
struct Slot {
    live: Option<StoreHandle>,
    pending: Option<SharedAttempt>,
    /// Bumped each time `pending` is set. A waiter only clears the slot when
    /// its own attempt is still the one stored there, so a late-waking
    /// co-waiter cannot wipe a newer attempt.
    epoch: u64,
}

/// Memoized access point for the backing store connection.
///
/// Guarantees:
///
/// - a successful connection is reused by all subsequent callers,
/// - callers that arrive before the first connect resolves share the same
///   in-flight attempt,
/// - a failed attempt is purged so the next caller retries from scratch.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use marketpulse::store::{ConnectionCache, TcpConnector};
///
/// # async fn demo() -> Result<(), marketpulse::store::StoreError> {
/// let cache = ConnectionCache::new(
///     Some("docstore://db.internal:7171/marketpulse".to_owned()),
///     Arc::new(TcpConnector),
/// );
/// let handle = cache.acquire().await?;
/// assert!(cache.acquire().await?.same_instance(&handle));
/// # Ok(())
/// # }
/// ```
pub struct ConnectionCache {
    uri: Option<String>,
    options: ConnectOptions,
    connector: Arc<dyn Connector>,
    slot: Mutex<Slot>,
}

impl ConnectionCache {
    /// Creates a cache over `connector` with default [`ConnectOptions`].
    ///
    /// `uri` is the configured store address, usually
    /// [`Config::store_uri`](crate::config::Config). A missing address is not
    /// an error here — [`acquire`](Self::acquire) reports it, so misconfigured
    /// deployments fail on first store use rather than at startup wiring.
    pub fn new(uri: Option<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            uri,
            options: ConnectOptions::default(),
            connector,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Overrides the options handed to the connect primitive.
    #[must_use]
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns `true` once a connection has been established.
    pub fn is_connected(&self) -> bool {
        self.slot().live.is_some()
    }

    /// Returns the ready-to-use store handle, connecting on first use.
    ///
    /// At most one underlying connect runs at a time: callers that arrive
    /// while an attempt is in flight await that same attempt and observe its
    /// outcome, success or failure.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Config`] — the store URI is missing or malformed. The
    ///   connect primitive is not invoked and cache state is untouched.
    /// - [`StoreError::Connection`] — the underlying connect failed. The
    ///   pending slot has been cleared, so a later call starts a fresh
    ///   attempt.
    pub async fn acquire(&self) -> Result<StoreHandle, StoreError> {
        let uri = self.checked_uri()?;

        // Check-then-act on the pending slot happens inside one critical
        // section; the lock is released before awaiting.
        let (attempt, epoch) = {
            let mut slot = self.slot();
            if let Some(handle) = slot.live.as_ref() {
                return Ok(handle.clone());
            }
            match slot.pending.as_ref() {
                Some(pending) => (pending.clone(), slot.epoch),
                None => {
                    let connector = Arc::clone(&self.connector);
                    let options = self.options.clone();
                    let attempt: SharedAttempt = async move {
                        connector.connect(&uri, &options).await.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    slot.pending = Some(attempt.clone());
                    slot.epoch += 1;
                    (attempt, slot.epoch)
                }
            }
        };

        match attempt.await {
            Ok(handle) => {
                let mut slot = self.slot();
                if slot.live.is_none() {
                    slot.live = Some(handle.clone());
                    info!(address = %handle.address(), "document store connected");
                }
                if slot.epoch == epoch {
                    slot.pending = None;
                }
                Ok(handle)
            }
            Err(cause) => {
                let mut slot = self.slot();
                if slot.epoch == epoch {
                    slot.pending = None;
                }
                Err(StoreError::Connection(cause))
            }
        }
    }

    /// Validates the configured URI without touching cache state.
    fn checked_uri(&self) -> Result<String, StoreError> {
        let uri = match self.uri.as_deref() {
            Some(uri) if !uri.trim().is_empty() => uri,
            _ => {
                return Err(StoreError::Config {
                    reason: "store URI is not set; define DOCSTORE_URI in the environment or .env"
                        .to_owned(),
                });
            }
        };

        let rest = uri.strip_prefix(URI_SCHEME).ok_or_else(|| StoreError::Config {
            reason: format!("store URI `{uri}` must use the `{URI_SCHEME}` scheme"),
        })?;

        if rest.split('/').next().unwrap_or("").is_empty() {
            return Err(StoreError::Config {
                reason: format!("store URI `{uri}` is missing a host"),
            });
        }

        Ok(uri.to_owned())
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    const TEST_URI: &str = "docstore://store.test:7171/app";

    /// Counts connect invocations; the first `failures` calls are rejected.
    struct FakeConnector {
        calls: AtomicUsize,
        failures: usize,
        delay: Duration,
    }

    impl FakeConnector {
        fn reliable() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures: 0,
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::reliable()
            }
        }

        fn failing_first(failures: usize) -> Self {
            Self {
                failures,
                ..Self::reliable()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            uri: &str,
            _options: &ConnectOptions,
        ) -> Result<StoreHandle, ConnectError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call < self.failures {
                return Err(ConnectError::Rejected {
                    reason: "credentials refused".to_owned(),
                });
            }
            Ok(StoreHandle::pooled(uri))
        }
    }

    fn cache_over(connector: &Arc<FakeConnector>) -> ConnectionCache {
        ConnectionCache::new(Some(TEST_URI.to_owned()), Arc::clone(connector) as _)
    }

    #[tokio::test]
    async fn sequential_calls_reuse_the_first_connection() {
        let connector = Arc::new(FakeConnector::reliable());
        let cache = cache_over(&connector);

        let first = cache.acquire().await.unwrap();
        let second = cache.acquire().await.unwrap();
        let third = cache.acquire().await.unwrap();

        assert!(first.same_instance(&second));
        assert!(first.same_instance(&third));
        assert!(!first.owns_socket());
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_attempt() {
        let connector = Arc::new(FakeConnector::slow(Duration::from_millis(50)));
        let cache = cache_over(&connector);

        let (a, b, c) = tokio::join!(cache.acquire(), cache.acquire(), cache.acquire());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert!(a.same_instance(&b));
        assert!(a.same_instance(&c));
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn failed_attempt_does_not_stick() {
        let connector = Arc::new(FakeConnector::failing_first(1));
        let cache = cache_over(&connector);

        let err = cache.acquire().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));

        let handle = cache.acquire().await.unwrap();
        assert_eq!(handle.address(), TEST_URI);
        assert_eq!(connector.calls(), 2);
    }

    #[tokio::test]
    async fn missing_uri_fails_before_dialing() {
        let connector = Arc::new(FakeConnector::reliable());
        let cache = ConnectionCache::new(None, Arc::clone(&connector) as _);

        let err = cache.acquire().await.unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
        assert_eq!(connector.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_uri_fails_before_dialing() {
        let connector = Arc::new(FakeConnector::reliable());
        let cache = ConnectionCache::new(
            Some("mysql://store.test/app".to_owned()),
            Arc::clone(&connector) as _,
        );

        let err = cache.acquire().await.unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
        assert_eq!(connector.calls(), 0);
    }

    #[tokio::test]
    async fn co_waiters_observe_the_same_failure() {
        let connector = Arc::new(FakeConnector {
            calls: AtomicUsize::new(0),
            failures: 1,
            delay: Duration::from_millis(50),
        });
        let cache = cache_over(&connector);

        let (a, b) = tokio::join!(cache.acquire(), cache.acquire());
        let (a, b) = (a.unwrap_err(), b.unwrap_err());

        assert_eq!(a.to_string(), b.to_string());
        assert!(a.to_string().contains("credentials refused"));
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn retry_after_shared_failure_dials_again() {
        let connector = Arc::new(FakeConnector {
            calls: AtomicUsize::new(0),
            failures: 1,
            delay: Duration::from_millis(20),
        });
        let cache = cache_over(&connector);

        let (a, b) = tokio::join!(cache.acquire(), cache.acquire());
        assert!(a.is_err() && b.is_err());

        let handle = cache.acquire().await.unwrap();
        assert_eq!(handle.address(), TEST_URI);
        assert_eq!(connector.calls(), 2);
    }

    #[tokio::test]
    async fn is_connected_tracks_the_live_handle() {
        let connector = Arc::new(FakeConnector::reliable());
        let cache = cache_over(&connector);

        assert!(!cache.is_connected());
        cache.acquire().await.unwrap();
        assert!(cache.is_connected());
    }
}
