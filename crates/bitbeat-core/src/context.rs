//! Request context types.
//!
//! The [`RequestContext`] carries all per-request state through the pipeline
//! stages and into the action body: the parameter sources and the merged
//! parameter bag, the mutable result, the raw request parts and the
//! response parts stages may adjust.

use crate::params::{ParamSources, Params};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tracked connection a request arrived on.
///
/// Inserted into the context extensions by the connection stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection identifier.
    pub id: Uuid,
    /// Remote address the connection is keyed by.
    pub remote: IpAddr,
    /// Whether the connection arrived over TLS.
    pub secure: bool,
}

/// Status and headers of the outgoing response.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    /// Response status, `200 OK` unless a stage changes it.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

impl ResponseParts {
    /// Sets the content type header.
    ///
    /// Invalid header values are ignored.
    pub fn set_content_type(&mut self, content_type: &str) {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
    }

    /// Returns the content type header, if set.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

impl Default for ResponseParts {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Per-request context that flows through the pipeline stages.
///
/// A context is owned by exactly one pipeline invocation and dropped once
/// the response has been produced.
///
/// # Example
///
/// ```
/// use bitbeat_core::RequestContext;
/// use http::Method;
/// use serde_json::json;
///
/// let ctx = RequestContext::builder()
///     .method(Method::POST)
///     .query_param("page", json!("2"))
///     .body_param("name", json!("ada"))
///     .build();
///
/// assert_eq!(ctx.sources().body["name"], json!("ada"));
/// assert!(ctx.params().is_empty());
/// ```
#[derive(Debug)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: SocketAddr,
    raw_body: Bytes,
    sources: ParamSources,
    params: Params,
    result: Value,
    response: ResponseParts,
    extensions: Extensions,
    started_at: Instant,
}

impl RequestContext {
    /// Starts building a request context.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a request header as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the remote socket address.
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns the unparsed request body.
    #[must_use]
    pub const fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Returns the parameter sources as received.
    #[must_use]
    pub const fn sources(&self) -> &ParamSources {
        &self.sources
    }

    /// Returns the merged parameter bag.
    ///
    /// Empty until the validation stage has run.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the merged parameter bag mutably.
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// Returns one merged parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Replaces the merged parameter bag.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Returns the current result.
    #[must_use]
    pub const fn result(&self) -> &Value {
        &self.result
    }

    /// Returns the result mutably.
    pub fn result_mut(&mut self) -> &mut Value {
        &mut self.result
    }

    /// Replaces the result.
    pub fn set_result(&mut self, result: Value) {
        self.result = result;
    }

    /// Takes the result, leaving `null` behind.
    pub fn take_result(&mut self) -> Value {
        self.result.take()
    }

    /// Returns the response parts.
    #[must_use]
    pub const fn response(&self) -> &ResponseParts {
        &self.response
    }

    /// Returns the response parts mutably.
    pub fn response_mut(&mut self) -> &mut ResponseParts {
        &mut self.response
    }

    /// Returns the request extensions.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns the request extensions mutably.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Returns the connection the request arrived on, once identified.
    #[must_use]
    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.extensions.get::<ConnectionInfo>()
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug)]
#[must_use]
pub struct RequestContextBuilder {
    request_id: Option<RequestId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: SocketAddr,
    raw_body: Bytes,
    sources: ParamSources,
    extensions: Extensions,
}

impl Default for RequestContextBuilder {
    fn default() -> Self {
        Self {
            request_id: None,
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            remote_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            raw_body: Bytes::new(),
            sources: ParamSources::default(),
            extensions: Extensions::new(),
        }
    }
}

impl RequestContextBuilder {
    /// Sets the request ID.
    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the URI.
    pub fn uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
    {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replaces all headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the remote address.
    pub fn remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    /// Sets the unparsed body.
    pub fn raw_body(mut self, body: Bytes) -> Self {
        self.raw_body = body;
        self
    }

    /// Replaces all parameter sources.
    pub fn sources(mut self, sources: ParamSources) -> Self {
        self.sources = sources;
        self
    }

    /// Adds a path parameter.
    pub fn path_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.sources.path.insert(name.into(), value);
        self
    }

    /// Adds a query parameter.
    pub fn query_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.sources.query.insert(name.into(), value);
        self
    }

    /// Adds a body parameter.
    pub fn body_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.sources.body.insert(name.into(), value);
        self
    }

    /// Inserts an extension value.
    pub fn extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            request_id: self.request_id.unwrap_or_default(),
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            remote_addr: self.remote_addr,
            raw_body: self.raw_body,
            sources: self.sources,
            params: Params::new(),
            result: Value::Object(serde_json::Map::new()),
            response: ResponseParts::default(),
            extensions: self.extensions,
            started_at: Instant::now(),
        }
    }
}
