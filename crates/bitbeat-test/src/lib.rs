//! # Bitbeat Test
//!
//! In-process testing for bitbeat servers: requests are dispatched straight
//! into a [`PreparedServer`](bitbeat_server::PreparedServer) without
//! binding a port, yet travel through connection tracking and every
//! pipeline stage.
//!
//! ## Example
//!
//! ```ignore
//! let client = TestClient::from_server(server)?;
//!
//! let response = client
//!     .get("/api/v1/search")
//!     .query("page", 2)
//!     .accept_version("1")
//!     .send()
//!     .await;
//!
//! response.assert_status(StatusCode::OK);
//! let body: serde_json::Value = response.json()?;
//! ```

#![doc(html_root_url = "https://docs.rs/bitbeat-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder, DEFAULT_REMOTE};
pub use response::TestResponse;
