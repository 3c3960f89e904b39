//! Lifecycle extension points around engine setup and serving.
//!
//! # Example
//!
//! ```rust
//! use bitbeat_server::Lifecycle;
//!
//! let lifecycle = Lifecycle::new()
//!     .on_post_route_register(|engine| {
//!         tracing::info!(routes = engine.routes().len(), "routes bound");
//!         Ok(())
//!     })
//!     .on_post_stop(|info| async move {
//!         tracing::info!(local_addr = ?info.local_addr, "server stopped");
//!         Ok(())
//!     });
//! ```
//!
//! # Execution Order
//!
//! | Phase | When | Receives |
//! |---|---|---|
//! | `pre_register` | before any action route is bound | `&mut dyn HttpEngine` |
//! | `post_register` | after pre-register hooks, still before binding | `&mut dyn HttpEngine` |
//! | `post_route_register` | after every action route is bound | `&mut dyn HttpEngine` |
//! | `post_start` | once the listener accepts connections | [`ServerInfo`] |
//! | `post_stop` | after connections are torn down and the listener released | [`ServerInfo`] |
//!
//! Hooks of one phase run one at a time in registration order. The first
//! failure stops the phase and is returned.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bitbeat_core::BoxFuture;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error};

use crate::engine::HttpEngine;

/// Error type for lifecycle hook failures.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A named hook failed during a phase.
    #[error("{phase} hook '{hook}' failed: {source}")]
    HookFailed {
        /// Hook name.
        hook: String,
        /// Phase the hook ran in.
        phase: Phase,
        /// The hook's error.
        #[source]
        source: Box<LifecycleError>,
    },

    /// Error returned from inside a hook.
    #[error("{message}")]
    Hook {
        /// Error message.
        message: String,
        /// Optional source error.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl LifecycleError {
    /// Creates a hook error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a hook error with a source.
    pub fn with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Hook {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Result type for lifecycle hooks.
pub type LifecycleResult<T = ()> = Result<T, LifecycleError>;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before action routes are bound.
    PreRegister,
    /// After pre-register hooks, before action routes are bound.
    PostRegister,
    /// After every action route is bound.
    PostRouteRegister,
    /// After the listener starts accepting.
    PostStart,
    /// After shutdown completed.
    PostStop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreRegister => "pre_register",
            Self::PostRegister => "post_register",
            Self::PostRouteRegister => "post_route_register",
            Self::PostStart => "post_start",
            Self::PostStop => "post_stop",
        })
    }
}

/// What a running server reports to `post_start` and `post_stop` hooks.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Bound address, `None` when serving in-process only.
    pub local_addr: Option<SocketAddr>,
    /// Number of registered routes.
    pub routes: usize,
    /// When the server was prepared.
    pub started_at: DateTime<Utc>,
}

/// Hook receiving the engine during route setup.
pub type EngineHook = Arc<dyn Fn(&mut dyn HttpEngine) -> LifecycleResult + Send + Sync>;

/// Hook receiving server information while serving.
pub type ServerHook = Arc<dyn Fn(ServerInfo) -> BoxFuture<'static, LifecycleResult> + Send + Sync>;

/// Extension hooks run at fixed points of the server lifecycle.
#[must_use]
#[derive(Default, Clone)]
pub struct Lifecycle {
    pre_register: Vec<(String, EngineHook)>,
    post_register: Vec<(String, EngineHook)>,
    post_route_register: Vec<(String, EngineHook)>,
    post_start: Vec<(String, ServerHook)>,
    post_stop: Vec<(String, ServerHook)>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("pre_register", &self.pre_register.len())
            .field("post_register", &self.post_register.len())
            .field("post_route_register", &self.post_route_register.len())
            .field("post_start", &self.post_start.len())
            .field("post_stop", &self.post_stop.len())
            .finish()
    }
}

impl Lifecycle {
    /// Creates an empty lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pre-register hook.
    pub fn on_pre_register<F>(self, hook: F) -> Self
    where
        F: Fn(&mut dyn HttpEngine) -> LifecycleResult + Send + Sync + 'static,
    {
        let name = format!("pre_register_{}", self.pre_register.len());
        self.on_pre_register_named(name, hook)
    }

    /// Registers a named pre-register hook.
    pub fn on_pre_register_named<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut dyn HttpEngine) -> LifecycleResult + Send + Sync + 'static,
    {
        self.pre_register.push((name.into(), Arc::new(hook)));
        self
    }

    /// Registers a post-register hook.
    pub fn on_post_register<F>(self, hook: F) -> Self
    where
        F: Fn(&mut dyn HttpEngine) -> LifecycleResult + Send + Sync + 'static,
    {
        let name = format!("post_register_{}", self.post_register.len());
        self.on_post_register_named(name, hook)
    }

    /// Registers a named post-register hook.
    pub fn on_post_register_named<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut dyn HttpEngine) -> LifecycleResult + Send + Sync + 'static,
    {
        self.post_register.push((name.into(), Arc::new(hook)));
        self
    }

    /// Registers a post-route-register hook. It may add custom routes.
    pub fn on_post_route_register<F>(self, hook: F) -> Self
    where
        F: Fn(&mut dyn HttpEngine) -> LifecycleResult + Send + Sync + 'static,
    {
        let name = format!("post_route_register_{}", self.post_route_register.len());
        self.on_post_route_register_named(name, hook)
    }

    /// Registers a named post-route-register hook.
    pub fn on_post_route_register_named<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut dyn HttpEngine) -> LifecycleResult + Send + Sync + 'static,
    {
        self.post_route_register.push((name.into(), Arc::new(hook)));
        self
    }

    /// Registers a post-start hook.
    pub fn on_post_start<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(ServerInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let name = format!("post_start_{}", self.post_start.len());
        self.on_post_start_named(name, hook)
    }

    /// Registers a named post-start hook.
    pub fn on_post_start_named<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(ServerInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let hook: ServerHook = Arc::new(move |info| Box::pin(hook(info)));
        self.post_start.push((name.into(), hook));
        self
    }

    /// Registers a post-stop hook.
    pub fn on_post_stop<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(ServerInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let name = format!("post_stop_{}", self.post_stop.len());
        self.on_post_stop_named(name, hook)
    }

    /// Registers a named post-stop hook.
    pub fn on_post_stop_named<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(ServerInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let hook: ServerHook = Arc::new(move |info| Box::pin(hook(info)));
        self.post_stop.push((name.into(), hook));
        self
    }

    /// Returns the number of hooks registered for a phase.
    #[must_use]
    pub fn hook_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::PreRegister => self.pre_register.len(),
            Phase::PostRegister => self.post_register.len(),
            Phase::PostRouteRegister => self.post_route_register.len(),
            Phase::PostStart => self.post_start.len(),
            Phase::PostStop => self.post_stop.len(),
        }
    }

    /// Runs the engine hooks of a setup phase.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::HookFailed`] for the first failing hook,
    /// or when `phase` is not a setup phase.
    pub fn run_engine_hooks(&self, phase: Phase, engine: &mut dyn HttpEngine) -> LifecycleResult {
        let hooks = match phase {
            Phase::PreRegister => &self.pre_register,
            Phase::PostRegister => &self.post_register,
            Phase::PostRouteRegister => &self.post_route_register,
            Phase::PostStart | Phase::PostStop => {
                return Err(LifecycleError::new(format!("{phase} is not a setup phase")));
            }
        };
        for (name, hook) in hooks {
            debug!(hook = %name, %phase, "running lifecycle hook");
            hook(&mut *engine).map_err(|e| failed(name, phase, e))?;
        }
        Ok(())
    }

    /// Runs the server hooks of a serving phase.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::HookFailed`] for the first failing hook,
    /// or when `phase` is not a serving phase.
    pub async fn run_server_hooks(&self, phase: Phase, info: &ServerInfo) -> LifecycleResult {
        let hooks = match phase {
            Phase::PostStart => &self.post_start,
            Phase::PostStop => &self.post_stop,
            Phase::PreRegister | Phase::PostRegister | Phase::PostRouteRegister => {
                return Err(LifecycleError::new(format!("{phase} is not a serving phase")));
            }
        };
        for (name, hook) in hooks {
            debug!(hook = %name, %phase, "running lifecycle hook");
            hook(info.clone()).await.map_err(|e| failed(name, phase, e))?;
        }
        Ok(())
    }

    /// Appends another lifecycle's hooks to this one's.
    pub fn merge(mut self, other: Lifecycle) -> Self {
        self.pre_register.extend(other.pre_register);
        self.post_register.extend(other.post_register);
        self.post_route_register.extend(other.post_route_register);
        self.post_start.extend(other.post_start);
        self.post_stop.extend(other.post_stop);
        self
    }
}

fn failed(hook: &str, phase: Phase, source: LifecycleError) -> LifecycleError {
    error!(hook = %hook, %phase, error = %source, "lifecycle hook failed");
    LifecycleError::HookFailed {
        hook: hook.to_string(),
        phase,
        source: Box::new(source),
    }
}
