//! # Bitbeat Server
//!
//! HTTP serving for bitbeat actions:
//!
//! - [`ConnectionManager`] - Per-client connection tracking with keep-alive recycling
//! - [`RouteBinder`] - One versioned route per action version
//! - [`Engine`] / [`HttpEngine`] - Route matching, request decoding, response encoding
//! - [`Lifecycle`] - Extension hooks around setup and serving
//! - [`WebServer`] - Wires everything together and serves with graceful shutdown
//!
//! ## Request flow
//!
//! ```text
//! hyper ─► Engine (route, decode) ─► connection ─► validation ─► format ─► execution ─► output ─► Engine (encode)
//! ```

#![doc(html_root_url = "https://docs.rs/bitbeat-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod binder;
mod connection;
mod engine;
mod error;
mod lifecycle;
mod router;
mod server;
mod shutdown;

pub use binder::{ConnectionStage, RouteBinder};
pub use connection::{
    Connection, ConnectionError, ConnectionManager, ConnectionMiddleware, EvictionReason,
    HookError, HookResult, RecycleFn, TransportHandle,
};
pub use engine::{
    Engine, EngineError, EngineSettings, HttpEngine, HttpResponse, ResponseBody,
    RouteRegistration, ACCEPT_VERSION, REQUEST_ID_HEADER,
};
pub use error::{ServerError, ServerResult};
pub use lifecycle::{
    EngineHook, Lifecycle, LifecycleError, LifecycleResult, Phase, ServerHook, ServerInfo,
};
pub use router::{parse_major, RouteLookup, RouteMatch, Router};
pub use server::{PreparedServer, WebServer, WebServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReceiver, ShutdownSignal};
