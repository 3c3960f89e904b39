//! # Bitbeat Core
//!
//! Core types and traits for bitbeat, a versioned, schema-validated action
//! layer on top of HTTP.
//!
//! This crate provides the foundational types used throughout bitbeat:
//!
//! - [`Action`] / [`ActionDefinition`] - Named, versioned request logic and its metadata
//! - [`FieldSchema`] / [`FieldType`] - Declared contract for one input or output field
//! - [`LocalizedText`] - Language-keyed descriptions
//! - [`ActionMiddleware`] - `before_run` / `after_run` hooks attached to actions
//! - [`RequestContext`] - Per-request parameter bag, result and raw request parts
//! - [`ActionRegistry`] - The explicit set of actions a server exposes
//! - [`ActionError`] - Error taxonomy shared by every pipeline stage

#![doc(html_root_url = "https://docs.rs/bitbeat-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod context;
mod error;
mod i18n;
mod middleware;
pub mod params;
mod registry;
mod schema;

use std::future::Future;
use std::pin::Pin;

pub use action::{Action, ActionDefinition, ActionDefinitionBuilder, FnAction, DEFAULT_CONTENT_TYPE};
pub use context::{ConnectionInfo, RequestContext, RequestContextBuilder, RequestId, ResponseParts};
pub use error::{ActionError, ActionResult, ErrorCategory, ErrorDetail, ErrorEnvelope};
pub use i18n::LocalizedText;
pub use middleware::ActionMiddleware;
pub use params::{ParamSources, Params};
pub use registry::{ActionRegistry, RegistryError};
pub use schema::{FieldFormatter, FieldSchema, FieldType, FieldValidator, Schema};

/// A boxed, sendable future.
///
/// Used wherever a trait method needs to be async while the trait stays
/// object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
