//! # Bitbeat Pipeline
//!
//! The per-request stage sequence every action runs through:
//!
//! 1. **Validation** - merge parameter sources, apply defaults, check
//!    required fields, types and validators
//! 2. **Format** - run field formatters over validated values
//! 3. **Execution** - accept-type negotiation, `before_run` hooks, the
//!    action body
//! 4. **Output shaping** - `after_run` hooks, strict output filtering
//!
//! Stages run strictly in order; the first failing stage short-circuits the
//! rest of the request. Field checks inside the validation and format
//! stages run concurrently with fail-fast semantics, while middleware hooks
//! always run one at a time in registration order.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use bitbeat_core::{ActionDefinition, FieldSchema, FnAction, RequestContext};
//! use bitbeat_pipeline::Pipeline;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let action = FnAction::from_sync(
//!     ActionDefinition::builder("double")
//!         .input("n", FieldSchema::number().required())
//!         .build(),
//!     |ctx| {
//!         let n = ctx.param("n").and_then(|v| v.as_i64()).unwrap_or_default();
//!         Ok(Some(json!({ "n": n * 2 })))
//!     },
//! );
//!
//! let pipeline = Pipeline::for_action(Arc::new(action));
//! let mut ctx = RequestContext::builder().query_param("n", json!("21")).build();
//! pipeline.process(&mut ctx).await.unwrap();
//! assert_eq!(ctx.result(), &json!({ "n": 42 }));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/bitbeat-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod hooks;
mod pipeline;
mod stage;
pub mod stages;

pub use pipeline::{Pipeline, PipelineBuilder};
pub use stage::{BoxedStage, FnStage, Stage, StageChain};
pub use stages::{ExecutionStage, FormatStage, OutputStage, ValidationStage};
