//! Route binding.
//!
//! The [`RouteBinder`] turns every registered action version into one
//! [`RouteRegistration`]: a versioned URL, the action's methods, an
//! optional version matcher and a pipeline whose validation slot starts
//! with the [`ConnectionStage`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitbeat_config::BitbeatConfig;
use bitbeat_core::{Action, ActionError, ActionRegistry, ActionResult, BoxFuture, RequestContext};
use bitbeat_pipeline::{BoxedStage, Pipeline, Stage};
use tracing::info;

use crate::connection::{ConnectionManager, RecycleFn, TransportHandle};
use crate::engine::{EngineError, HttpEngine, RouteRegistration};

/// Stage identifying the client connection of a request.
///
/// Looks up or creates the [`Connection`](crate::Connection) for the
/// request's remote address and exposes its
/// [`ConnectionInfo`](bitbeat_core::ConnectionInfo) through the context
/// extensions. A rejecting creation hook fails the request with
/// `CONNECTION_REJECTED`.
///
/// Connections created by the stage count themselves when recycled.
#[derive(Debug)]
pub struct ConnectionStage {
    manager: Arc<ConnectionManager>,
    secure: bool,
    recycled: Arc<AtomicU64>,
}

impl ConnectionStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>, secure: bool) -> Self {
        Self {
            manager,
            secure,
            recycled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of connections created by this stage that have been recycled.
    #[must_use]
    pub fn recycled(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }
}

impl Stage for ConnectionStage {
    fn name(&self) -> &'static str {
        "connection"
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            let remote = ctx.remote_addr().ip();
            let transport = ctx
                .extensions()
                .get::<TransportHandle>()
                .cloned()
                .unwrap_or_default();
            let recycled = Arc::clone(&self.recycled);
            let recycle: RecycleFn = Box::new(move |_, _| {
                recycled.fetch_add(1, Ordering::Relaxed);
            });

            let connection = self
                .manager
                .get_or_create(remote, &transport, self.secure, Some(recycle))
                .await
                .map_err(|e| ActionError::connection_rejected(e.to_string()))?;
            ctx.extensions_mut().insert(connection.info());
            Ok(())
        })
    }
}

/// Computes and registers the route of every action version.
///
/// Every route shares one [`ConnectionStage`].
#[derive(Debug, Clone)]
pub struct RouteBinder {
    config: Arc<BitbeatConfig>,
    stage: Arc<ConnectionStage>,
}

impl RouteBinder {
    /// Creates a binder.
    #[must_use]
    pub fn new(config: Arc<BitbeatConfig>, connections: Arc<ConnectionManager>) -> Self {
        let stage = Arc::new(ConnectionStage::new(connections, config.server.secure));
        Self { config, stage }
    }

    /// Returns the connection stage shared by the bound routes.
    #[must_use]
    pub fn connection_stage(&self) -> &Arc<ConnectionStage> {
        &self.stage
    }

    /// Builds the registration for one action.
    ///
    /// With path versioning the URL is `/{path}/v{version}/{name}`; with
    /// header versioning it is `/{path}/{name}` and the registration
    /// carries the `{version}.0.0` matcher.
    #[must_use]
    pub fn route_for(&self, action: &Arc<dyn Action>) -> RouteRegistration {
        let definition = action.definition();
        let pipeline = Pipeline::builder(Arc::clone(action))
            .before_validation(Arc::clone(&self.stage) as BoxedStage)
            .build();

        RouteRegistration {
            url: self
                .config
                .action_path(definition.name(), definition.version()),
            methods: definition.methods().to_vec(),
            version: self.config.version_matcher(definition.version()),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Registers every action of `registry` with `engine`, in registration
    /// order. Returns the number of routes bound.
    ///
    /// # Errors
    ///
    /// Stops at the first route the engine refuses.
    pub fn bind(
        &self,
        registry: &ActionRegistry,
        engine: &mut dyn HttpEngine,
    ) -> Result<usize, EngineError> {
        let mut bound = 0;
        for action in registry.iter() {
            engine.route(self.route_for(action))?;
            bound += 1;
        }
        info!(routes = bound, "actions bound");
        Ok(bound)
    }
}
