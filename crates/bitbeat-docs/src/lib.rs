//! # Bitbeat Docs
//!
//! Documentation generated from the same action metadata the pipeline
//! enforces.
//!
//! [`DocumentationGenerator`] walks every registered action version and
//! produces a `name → version → entry` mapping. Each entry carries the
//! resolved route path, internal and external URLs, the description in the
//! requested language, and the public shape of every input and output field.
//! Validators and formatters are never part of the output.
//!
//! [`DocumentationAction`] exposes the generator as the `documentation`
//! action, so the API describes itself.
//!
//! ```rust
//! use bitbeat_config::BitbeatConfig;
//! use bitbeat_core::{ActionDefinition, ActionRegistry, FnAction};
//! use bitbeat_docs::DocumentationGenerator;
//!
//! let mut registry = ActionRegistry::new();
//! registry
//!     .register(FnAction::from_sync(
//!         ActionDefinition::builder("status").description("Server status").build(),
//!         |_| Ok(None),
//!     ))
//!     .unwrap();
//!
//! let docs = DocumentationGenerator::from_registry(&registry, BitbeatConfig::default())
//!     .generate("en", "en");
//! assert_eq!(docs["status"]["1"]["path"], "/api/v1/status");
//! ```

#![doc(html_root_url = "https://docs.rs/bitbeat-docs/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod error;
mod generator;

pub use action::DocumentationAction;
pub use error::{DocsError, DocsResult};
pub use generator::DocumentationGenerator;
