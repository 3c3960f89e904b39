//! Connection tracking.
//!
//! A [`Connection`] is the server's record of one client, keyed by remote
//! IP address. The [`ConnectionManager`] owns every live connection and its
//! lifecycle:
//!
//! ```text
//!             get_or_create (miss)                     get_or_create (hit)
//!   ───────► before_create* ──► live ──► after_create*     refresh keep-alive
//!                 │ fails                  │
//!                 ▼                        │ idle timeout / transport closed / shutdown
//!             rejected                     ▼
//!                         before_destroy* ──► removed ──► [close transport] ──► after_destroy* ──► recycle
//! ```
//!
//! Hook fan-outs (`*`) run one middleware at a time in registration order
//! and stop at the first failure. Creation and eviction for the same remote
//! address are serialized, so no task ever observes a half-registered or
//! half-evicted connection.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bitbeat_core::{BoxFuture, ConnectionInfo};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::shutdown::{ShutdownReceiver, ShutdownSignal};

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to the transport (TCP connection) a client connected over.
///
/// Cloning shares the handle; closing any clone closes the transport.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    id: u64,
    close: ShutdownSignal,
}

impl TransportHandle {
    /// Creates a handle for a newly accepted transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            close: ShutdownSignal::new(),
        }
    }

    /// Returns the transport ID, unique within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Asks the transport to close.
    pub fn close(&self) {
        self.close.trigger();
    }

    /// Returns `true` once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_shutdown()
    }

    /// Completes once the transport is asked to close.
    pub fn closed(&self) -> ShutdownReceiver {
        self.close.recv()
    }
}

impl Default for TransportHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a connection was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// No request arrived within the keep-alive window.
    Idle,
    /// The transport that created the connection closed.
    TransportClosed,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::TransportClosed => "transport_closed",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Callback invoked exactly once when a connection is evicted.
pub type RecycleFn = Box<dyn FnOnce(&Connection, EvictionReason) + Send>;

/// One tracked client.
pub struct Connection {
    id: Uuid,
    remote: IpAddr,
    transport: TransportHandle,
    secure: bool,
    created_at: DateTime<Utc>,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    recycle: Mutex<Option<RecycleFn>>,
}

impl Connection {
    fn new(
        remote: IpAddr,
        transport: TransportHandle,
        secure: bool,
        recycle: Option<RecycleFn>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            remote,
            transport,
            secure,
            created_at: Utc::now(),
            keep_alive: Mutex::new(None),
            generation: AtomicU64::new(0),
            recycle: Mutex::new(recycle),
        }
    }

    /// Returns the connection ID.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the remote address this connection is keyed by.
    #[must_use]
    pub fn remote(&self) -> IpAddr {
        self.remote
    }

    /// Returns the transport that created this connection.
    #[must_use]
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Returns `true` if the connection arrived over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the summary exposed to actions.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            remote: self.remote,
            secure: self.secure,
        }
    }

    /// Returns `true` while a keep-alive timer is pending.
    #[must_use]
    pub fn has_keep_alive_timer(&self) -> bool {
        self.keep_alive
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    fn replace_timer(&self, timer: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(&mut *self.keep_alive.lock(), timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn recycle(&self, reason: EvictionReason) {
        let recycle = self.recycle.lock().take();
        if let Some(recycle) = recycle {
            recycle(self, reason);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("transport", &self.transport.id())
            .field("secure", &self.secure)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Failure reported by a connection middleware hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl HookError {
    /// Creates a hook error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a hook error wrapping another error.
    pub fn with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Result type for connection hooks.
pub type HookResult = Result<(), HookError>;

/// Hooks around the connection lifecycle.
///
/// Every hook defaults to a no-op; implement only the ones you need.
///
/// ```rust
/// use bitbeat_core::BoxFuture;
/// use bitbeat_server::{Connection, ConnectionMiddleware, HookError, HookResult};
///
/// struct DenyLoopback;
///
/// impl ConnectionMiddleware for DenyLoopback {
///     fn name(&self) -> &'static str {
///         "deny-loopback"
///     }
///
///     fn before_create<'a>(&'a self, connection: &'a Connection) -> BoxFuture<'a, HookResult> {
///         Box::pin(async move {
///             if connection.remote().is_loopback() {
///                 return Err(HookError::new("loopback clients are not allowed"));
///             }
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait ConnectionMiddleware: Send + Sync + 'static {
    /// Returns the middleware name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Runs before a new connection joins the live set. A failure rejects
    /// the request and the connection is discarded.
    fn before_create<'a>(&'a self, _connection: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async { Ok(()) })
    }

    /// Runs after a new connection joined the live set.
    fn after_create<'a>(&'a self, _connection: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async { Ok(()) })
    }

    /// Runs before a connection leaves the live set.
    fn before_destroy<'a>(&'a self, _connection: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async { Ok(()) })
    }

    /// Runs after a connection left the live set.
    fn after_destroy<'a>(&'a self, _connection: &'a Connection) -> BoxFuture<'a, HookResult> {
        Box::pin(async { Ok(()) })
    }
}

/// Connection lifecycle failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A creation hook failed.
    #[error("connection rejected by '{middleware}' in {hook}: {source}")]
    Rejected {
        /// Middleware that failed.
        middleware: &'static str,
        /// Hook that failed.
        hook: &'static str,
        /// The hook's error.
        #[source]
        source: HookError,
    },
}

#[derive(Clone, Copy)]
enum Hook {
    BeforeCreate,
    AfterCreate,
    BeforeDestroy,
    AfterDestroy,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
        }
    }
}

/// Owner of every live [`Connection`].
pub struct ConnectionManager {
    live: DashMap<IpAddr, Arc<Connection>>,
    gates: DashMap<IpAddr, Arc<tokio::sync::Mutex<()>>>,
    middlewares: Vec<Arc<dyn ConnectionMiddleware>>,
    keep_alive: Option<Duration>,
    this: Weak<ConnectionManager>,
}

impl ConnectionManager {
    /// Creates a manager.
    ///
    /// `keep_alive` is the idle window after which a connection is evicted;
    /// `None` keeps connections until their transport closes.
    #[must_use]
    pub fn new(
        keep_alive: Option<Duration>,
        middlewares: Vec<Arc<dyn ConnectionMiddleware>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            live: DashMap::new(),
            gates: DashMap::new(),
            middlewares,
            keep_alive,
            this: this.clone(),
        })
    }

    /// Returns the keep-alive window.
    #[must_use]
    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive
    }

    /// Returns the live connection for `remote`, if any.
    #[must_use]
    pub fn lookup(&self, remote: IpAddr) -> Option<Arc<Connection>> {
        self.live.get(&remote).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Returns a snapshot of the live connections.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.live.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Returns the live connection for `remote`, creating it on a miss.
    ///
    /// On a hit the keep-alive timer is restarted and no hook runs. On a
    /// miss `before_create` hooks run first; the connection joins the live
    /// set only if all of them succeed, then `after_create` hooks run. An
    /// `after_create` failure is reported but the connection stays live.
    pub async fn get_or_create(
        &self,
        remote: IpAddr,
        transport: &TransportHandle,
        secure: bool,
        recycle: Option<RecycleFn>,
    ) -> Result<Arc<Connection>, ConnectionError> {
        let gate = self.gate(remote);
        let outcome = {
            let _serialized = gate.lock().await;
            self.get_or_create_locked(remote, transport, secure, recycle)
                .await
        };
        self.release_gate(remote, &gate);
        outcome
    }

    async fn get_or_create_locked(
        &self,
        remote: IpAddr,
        transport: &TransportHandle,
        secure: bool,
        recycle: Option<RecycleFn>,
    ) -> Result<Arc<Connection>, ConnectionError> {
        if let Some(existing) = self.lookup(remote) {
            debug!(connection_id = %existing.id(), %remote, "reusing connection");
            self.schedule_keep_alive(&existing);
            return Ok(existing);
        }

        let connection = Arc::new(Connection::new(remote, transport.clone(), secure, recycle));
        self.run_hooks(Hook::BeforeCreate, &connection).await?;

        self.live.insert(remote, Arc::clone(&connection));
        self.schedule_keep_alive(&connection);
        debug!(
            connection_id = %connection.id(),
            %remote,
            transport = transport.id(),
            "created connection"
        );

        self.run_hooks(Hook::AfterCreate, &connection).await?;
        Ok(connection)
    }

    /// Evicts a connection.
    ///
    /// Returns `false` if it was no longer live. Otherwise runs
    /// `before_destroy` hooks, removes it from the live set, closes its
    /// transport when `reason` is [`EvictionReason::Shutdown`], runs
    /// `after_destroy` hooks and finally the recycle callback. Hook
    /// failures are logged and do not stop the eviction.
    pub async fn evict(&self, connection: &Arc<Connection>, reason: EvictionReason) -> bool {
        self.evict_if(connection, reason, None).await
    }

    /// Evicts every live connection created by the transport `transport_id`.
    pub async fn transport_closed(&self, transport_id: u64) -> usize {
        let owned: Vec<_> = self
            .live
            .iter()
            .filter(|entry| entry.value().transport().id() == transport_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut evicted = 0;
        for connection in owned {
            if self.evict(&connection, EvictionReason::TransportClosed).await {
                evicted += 1;
            }
        }
        evicted
    }

    /// Evicts every live connection, concurrently across connections.
    pub async fn shutdown(&self) -> usize {
        let connections = self.connections();
        let results = futures_util::future::join_all(
            connections
                .iter()
                .map(|connection| self.evict(connection, EvictionReason::Shutdown)),
        )
        .await;
        results.into_iter().filter(|evicted| *evicted).count()
    }

    async fn evict_if(
        &self,
        connection: &Arc<Connection>,
        reason: EvictionReason,
        generation: Option<u64>,
    ) -> bool {
        let remote = connection.remote();
        let gate = self.gate(remote);
        let evicted = {
            let _serialized = gate.lock().await;
            let current = self
                .lookup(remote)
                .is_some_and(|live| Arc::ptr_eq(&live, connection));
            let refreshed = generation
                .is_some_and(|g| g != connection.generation.load(Ordering::SeqCst));
            if current && !refreshed {
                self.teardown(connection, reason).await;
                true
            } else {
                false
            }
        };
        self.release_gate(remote, &gate);
        evicted
    }

    async fn teardown(&self, connection: &Arc<Connection>, reason: EvictionReason) {
        connection.replace_timer(None);

        if let Err(error) = self.run_hooks(Hook::BeforeDestroy, connection).await {
            warn!(connection_id = %connection.id(), %error, "continuing eviction");
        }

        self.live
            .remove_if(&connection.remote(), |_, live| Arc::ptr_eq(live, connection));

        if reason == EvictionReason::Shutdown {
            connection.transport().close();
        }

        if let Err(error) = self.run_hooks(Hook::AfterDestroy, connection).await {
            warn!(connection_id = %connection.id(), %error, "after_destroy failed");
        }

        connection.recycle(reason);
        debug!(
            connection_id = %connection.id(),
            remote = %connection.remote(),
            %reason,
            "evicted connection"
        );
    }

    async fn run_hooks(&self, hook: Hook, connection: &Connection) -> Result<(), ConnectionError> {
        for middleware in &self.middlewares {
            let result = match hook {
                Hook::BeforeCreate => middleware.before_create(connection).await,
                Hook::AfterCreate => middleware.after_create(connection).await,
                Hook::BeforeDestroy => middleware.before_destroy(connection).await,
                Hook::AfterDestroy => middleware.after_destroy(connection).await,
            };
            if let Err(source) = result {
                warn!(
                    middleware = middleware.name(),
                    hook = hook.name(),
                    connection_id = %connection.id(),
                    remote = %connection.remote(),
                    error = %source,
                    "connection hook failed"
                );
                return Err(ConnectionError::Rejected {
                    middleware: middleware.name(),
                    hook: hook.name(),
                    source,
                });
            }
        }
        Ok(())
    }

    fn schedule_keep_alive(&self, connection: &Arc<Connection>) {
        let Some(keep_alive) = self.keep_alive else {
            return;
        };
        let generation = connection.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let manager = self.this.clone();
        let target = Arc::downgrade(connection);

        let timer = tokio::spawn(async move {
            tokio::time::sleep(keep_alive).await;
            let (Some(manager), Some(connection)) = (manager.upgrade(), target.upgrade()) else {
                return;
            };
            // Eviction runs in its own task: aborting this timer must not
            // cancel an eviction that already started.
            tokio::spawn(async move {
                manager
                    .evict_if(&connection, EvictionReason::Idle, Some(generation))
                    .await;
            });
        });
        connection.replace_timer(Some(timer));
    }

    fn gate(&self, remote: IpAddr) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.gates.entry(remote).or_default().value())
    }

    fn release_gate(&self, remote: IpAddr, gate: &Arc<tokio::sync::Mutex<()>>) {
        self.gates
            .remove_if(&remote, |_, current| {
                Arc::ptr_eq(current, gate) && Arc::strong_count(current) == 2
            });
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("live", &self.live.len())
            .field("middlewares", &self.middlewares.len())
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}
