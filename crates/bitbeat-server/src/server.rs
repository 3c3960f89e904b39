//! The web server.
//!
//! # Architecture
//!
//! [`WebServer::prepare`] performs every setup step that does not need a
//! socket:
//!
//! 1. validate the configuration
//! 2. register the `documentation` action when enabled
//! 3. run `pre_register` and `post_register` hooks
//! 4. bind one route per action version
//! 5. run `post_route_register` hooks
//!
//! The resulting [`PreparedServer`] can answer requests in-process through
//! [`PreparedServer::dispatch`] or serve a TCP listener. Shutdown tears
//! down every live connection (closing its transport), waits for open
//! transports up to the shutdown timeout, releases the listener and runs
//! `post_stop` hooks.
//!
//! # Example
//!
//! ```rust,no_run
//! use bitbeat_config::BitbeatConfig;
//! use bitbeat_core::{ActionDefinition, FnAction};
//! use bitbeat_server::WebServer;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     WebServer::builder()
//!         .config(BitbeatConfig::development())
//!         .action(FnAction::from_sync(ActionDefinition::builder("ping").build(), |_| {
//!             Ok(Some(json!({"pong": true})))
//!         }))
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bitbeat_config::BitbeatConfig;
use bitbeat_core::{Action, ActionRegistry, RequestId};
use bitbeat_docs::{DocumentationAction, DocumentationGenerator};
use bitbeat_telemetry::{init_logging, TelemetryError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::binder::{ConnectionStage, RouteBinder};
use crate::connection::{ConnectionManager, ConnectionMiddleware, TransportHandle};
use crate::engine::{failure, payload_too_large, Engine, EngineSettings, HttpEngine, HttpResponse};
use crate::error::ServerResult;
use crate::lifecycle::{Lifecycle, Phase, ServerInfo};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// A configured, not yet prepared server.
pub struct WebServer {
    config: BitbeatConfig,
    registry: ActionRegistry,
    actions: Vec<Arc<dyn Action>>,
    connection_middlewares: Vec<Arc<dyn ConnectionMiddleware>>,
    lifecycle: Lifecycle,
    overrides: Vec<(String, u32, Value)>,
}

impl WebServer {
    /// Creates a server builder.
    #[must_use]
    pub fn builder() -> WebServerBuilder {
        WebServerBuilder::default()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BitbeatConfig {
        &self.config
    }

    /// Runs every setup step and returns a server ready to answer requests.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, duplicate actions or routes, an
    /// invalid documentation override, or a failing setup hook.
    pub fn prepare(self) -> ServerResult<PreparedServer> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let mut registry = self.registry;
        for action in self.actions {
            registry.register_arc(action)?;
        }

        if config.actions.documentation && registry.get(DocumentationAction::NAME, 1).is_none() {
            let mut generator = DocumentationGenerator::from_registry(&registry, (*config).clone());
            for (name, version, value) in self.overrides {
                generator = generator.with_override(name, version, value)?;
            }
            DocumentationAction::register(generator, &mut registry)?;
        } else if !self.overrides.is_empty() {
            warn!(
                overrides = self.overrides.len(),
                "documentation overrides ignored, the documentation action is not generated"
            );
        }

        let connections = ConnectionManager::new(
            config.connections.keep_alive(),
            self.connection_middlewares,
        );
        let mut engine = Engine::new(EngineSettings::from_config(&config));

        self.lifecycle
            .run_engine_hooks(Phase::PreRegister, &mut engine)?;
        self.lifecycle
            .run_engine_hooks(Phase::PostRegister, &mut engine)?;
        let binder = RouteBinder::new(Arc::clone(&config), Arc::clone(&connections));
        binder.bind(&registry, &mut engine)?;
        self.lifecycle
            .run_engine_hooks(Phase::PostRouteRegister, &mut engine)?;

        Ok(PreparedServer {
            config,
            registry,
            connections,
            connection_stage: Arc::clone(binder.connection_stage()),
            engine,
            lifecycle: self.lifecycle,
            started_at: Utc::now(),
        })
    }

    /// Initialises logging, prepares the server and serves on the
    /// configured address until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// See [`prepare`](Self::prepare) and [`PreparedServer::run`].
    pub async fn run(self) -> ServerResult<()> {
        match init_logging(&self.config.logging.to_log_config()) {
            Ok(()) | Err(TelemetryError::AlreadyInitialized) => {}
            Err(e) => return Err(e.into()),
        }
        self.prepare()?.run(ShutdownSignal::with_os_signals()).await
    }
}

impl fmt::Debug for WebServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebServer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("actions", &self.actions.len())
            .field("connection_middlewares", &self.connection_middlewares.len())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Builder for [`WebServer`].
#[must_use]
#[derive(Default)]
pub struct WebServerBuilder {
    config: BitbeatConfig,
    registry: ActionRegistry,
    actions: Vec<Arc<dyn Action>>,
    connection_middlewares: Vec<Arc<dyn ConnectionMiddleware>>,
    lifecycle: Lifecycle,
    overrides: Vec<(String, u32, Value)>,
}

impl WebServerBuilder {
    /// Sets the configuration.
    pub fn config(mut self, config: BitbeatConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing registry as the base set of actions.
    pub fn registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Adds an action. Duplicates are reported by [`WebServer::prepare`].
    pub fn action(self, action: impl Action) -> Self {
        self.shared_action(Arc::new(action))
    }

    /// Adds a shared action.
    pub fn shared_action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.push(action);
        self
    }

    /// Adds a connection middleware. Hooks run in the order added.
    pub fn connection_middleware(mut self, middleware: impl ConnectionMiddleware) -> Self {
        self.connection_middlewares.push(Arc::new(middleware));
        self
    }

    /// Sets the lifecycle hooks, merging with any set before.
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = std::mem::take(&mut self.lifecycle).merge(lifecycle);
        self
    }

    /// Adds a documentation override for one action version.
    pub fn documentation_override(
        mut self,
        name: impl Into<String>,
        version: u32,
        value: Value,
    ) -> Self {
        self.overrides.push((name.into(), version, value));
        self
    }

    /// Builds the server.
    pub fn build(self) -> WebServer {
        WebServer {
            config: self.config,
            registry: self.registry,
            actions: self.actions,
            connection_middlewares: self.connection_middlewares,
            lifecycle: self.lifecycle,
            overrides: self.overrides,
        }
    }
}

/// A server with every route bound.
pub struct PreparedServer {
    config: Arc<BitbeatConfig>,
    registry: ActionRegistry,
    connections: Arc<ConnectionManager>,
    connection_stage: Arc<ConnectionStage>,
    engine: Engine,
    lifecycle: Lifecycle,
    started_at: DateTime<Utc>,
}

impl PreparedServer {
    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BitbeatConfig {
        &self.config
    }

    /// Returns the registered actions, including built-in ones.
    #[must_use]
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Returns the connection manager.
    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Number of connections recycled since the server was prepared.
    #[must_use]
    pub fn recycled_connections(&self) -> u64 {
        self.connection_stage.recycled()
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns what lifecycle hooks are told about this server.
    #[must_use]
    pub fn info(&self, local_addr: Option<SocketAddr>) -> ServerInfo {
        ServerInfo {
            local_addr,
            routes: self.engine.routes().len(),
            started_at: self.started_at,
        }
    }

    /// Answers a request in-process, as if it arrived on a fresh transport
    /// from `remote`.
    pub async fn dispatch(&self, request: Request<Bytes>, remote: SocketAddr) -> HttpResponse {
        self.engine
            .dispatch(request, remote, TransportHandle::new())
            .await
    }

    /// Answers a request in-process on an existing transport.
    pub async fn dispatch_on(
        &self,
        request: Request<Bytes>,
        remote: SocketAddr,
        transport: &TransportHandle,
    ) -> HttpResponse {
        self.engine
            .dispatch(request, remote, transport.clone())
            .await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound; see also [`serve`](Self::serve).
    pub async fn run(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| crate::ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serves `listener` until `shutdown` fires, then tears down.
    ///
    /// # Errors
    ///
    /// Fails if a `post_start` or `post_stop` hook fails, or the listener
    /// address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        let info = self.info(Some(local_addr));
        self.lifecycle
            .run_server_hooks(Phase::PostStart, &info)
            .await?;
        info!(%local_addr, routes = info.routes, "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            server.serve_transport(stream, remote, shutdown).await;
                            drop(token);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    info!("shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let evicted = server.connections.shutdown().await;
        info!(
            evicted,
            recycled = server.connection_stage.recycled(),
            "connections torn down"
        );

        let timeout = server.config.server.shutdown_timeout();
        tokio::select! {
            () = tracker.wait_for_shutdown() => debug!("all transports closed"),
            () = tokio::time::sleep(timeout) => warn!(
                active = tracker.active_connections(),
                ?timeout,
                "shutdown timeout reached with transports still open"
            ),
        }
        drop(listener);

        server
            .lifecycle
            .run_server_hooks(Phase::PostStop, &info)
            .await?;
        info!("server stopped");
        Ok(())
    }

    async fn serve_transport(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        shutdown: ShutdownSignal,
    ) {
        let transport = TransportHandle::new();
        let server = Arc::clone(&self);
        let handle = transport.clone();
        let service = service_fn(move |request: Request<Incoming>| {
            let server = Arc::clone(&server);
            let handle = handle.clone();
            async move { Ok::<_, Infallible>(server.handle(request, remote, handle).await) }
        });

        let connection = http1::Builder::new()
            .keep_alive(true)
            .serve_connection(TokioIo::new(stream), service);
        tokio::pin!(connection);

        let mut closing = false;
        loop {
            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(e) = result {
                        debug!(%remote, error = %e, "transport error");
                    }
                    break;
                }
                () = transport.closed(), if !closing => {
                    closing = true;
                    connection.as_mut().graceful_shutdown();
                }
                () = shutdown.recv(), if !closing => {
                    closing = true;
                    connection.as_mut().graceful_shutdown();
                }
            }
        }

        if !shutdown.is_shutdown() {
            self.connections.transport_closed(transport.id()).await;
        }
    }

    async fn handle(
        &self,
        request: Request<Incoming>,
        remote: SocketAddr,
        transport: TransportHandle,
    ) -> HttpResponse {
        let (parts, body) = request.into_parts();
        let limit = self.engine.settings().max_body_bytes;
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return payload_too_large(RequestId::new(), limit);
            }
            Err(e) => {
                return failure(
                    RequestId::new(),
                    StatusCode::BAD_REQUEST,
                    "BODY_READ_ERROR",
                    format!("failed to read request body: {e}"),
                );
            }
        };
        self.engine
            .dispatch(Request::from_parts(parts, body), remote, transport)
            .await
    }
}

impl fmt::Debug for PreparedServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedServer")
            .field("routes", &self.engine.routes().len())
            .field("connections", &self.connections)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RouteRegistration;
    use crate::lifecycle::LifecycleError;
    use crate::ServerError;
    use bitbeat_core::{ActionDefinition, FnAction};
    use bitbeat_pipeline::Pipeline;
    use http::Method;
    use serde_json::json;

    fn ping() -> FnAction {
        FnAction::from_sync(
            ActionDefinition::builder("ping").methods([Method::GET]).build(),
            |_| Ok(Some(json!({"pong": true}))),
        )
    }

    #[test]
    fn test_prepare_registers_documentation() {
        let server = WebServer::builder().action(ping()).build().prepare().unwrap();
        let urls: Vec<_> = server.engine().routes().iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["/api/v1/ping", "/api/v1/documentation"]);
        assert!(server.registry().get(DocumentationAction::NAME, 1).is_some());
    }

    #[test]
    fn test_prepare_without_documentation() {
        let mut config = BitbeatConfig::default();
        config.actions.documentation = false;
        let server = WebServer::builder()
            .config(config)
            .action(ping())
            .build()
            .prepare()
            .unwrap();
        assert_eq!(server.engine().routes().len(), 1);
    }

    #[test]
    fn test_prepare_rejects_invalid_config() {
        let mut config = BitbeatConfig::default();
        config.server.port = 0;
        let err = WebServer::builder().config(config).build().prepare().unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn test_prepare_rejects_duplicate_action() {
        let err = WebServer::builder()
            .action(ping())
            .action(ping())
            .build()
            .prepare()
            .unwrap_err();
        assert!(matches!(err, ServerError::Registry(_)));
    }

    #[test]
    fn test_prepare_rejects_non_object_override() {
        let err = WebServer::builder()
            .action(ping())
            .documentation_override("ping", 1, json!("nope"))
            .build()
            .prepare()
            .unwrap_err();
        assert!(matches!(err, ServerError::Docs(_)));
    }

    #[test]
    fn test_post_route_register_can_add_routes() {
        let lifecycle = Lifecycle::new().on_post_route_register(|engine| {
            let action = Arc::new(FnAction::from_sync(
                ActionDefinition::builder("health").build(),
                |_| Ok(Some(json!({"ok": true}))),
            ));
            engine
                .route(RouteRegistration {
                    url: "/health".into(),
                    methods: vec![Method::GET],
                    version: None,
                    pipeline: Arc::new(Pipeline::for_action(action)),
                })
                .map_err(|e| LifecycleError::with_source("health route", e))
        });
        let server = WebServer::builder().lifecycle(lifecycle).build().prepare().unwrap();
        assert!(server.engine().routes().iter().any(|r| r.url == "/health"));
    }

    #[test]
    fn test_failing_setup_hook_aborts() {
        let lifecycle =
            Lifecycle::new().on_pre_register(|_| Err(LifecycleError::new("not ready")));
        let err = WebServer::builder().lifecycle(lifecycle).build().prepare().unwrap_err();
        assert!(matches!(err, ServerError::Lifecycle(_)));
    }

    #[tokio::test]
    async fn test_dispatch_in_process() {
        let server = WebServer::builder().action(ping()).build().prepare().unwrap();
        let request = Request::get("/api/v1/ping").body(Bytes::new()).unwrap();
        let response = server
            .dispatch(request, "127.0.0.1:9000".parse().unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.connections().len(), 1);
    }
}
