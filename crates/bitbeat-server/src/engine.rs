//! The HTTP engine.
//!
//! [`HttpEngine`] is the seam between route binding and transport: the
//! binder registers one [`RouteRegistration`] per action version and the
//! engine owns matching, request decoding and response encoding.
//! [`Engine`] is the hyper-backed implementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bitbeat_config::BitbeatConfig;
use bitbeat_core::{
    ActionError, ErrorCategory, ErrorDetail, ErrorEnvelope, ParamSources, Params,
    RequestContext, RequestId,
};
use bitbeat_pipeline::Pipeline;
use bitbeat_telemetry::{log_request_complete, log_request_error};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::connection::TransportHandle;
use crate::router::{parse_major, RouteLookup, Router};

/// Response body type produced by the engine.
pub type ResponseBody = Full<Bytes>;

/// HTTP response produced by the engine.
pub type HttpResponse = Response<ResponseBody>;

/// Request header selecting an action version when header versioning is on.
pub const ACCEPT_VERSION: HeaderName = HeaderName::from_static("accept-version");

/// Response header echoing the request ID.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// One route as registered with an engine.
#[derive(Debug, Clone)]
pub struct RouteRegistration {
    /// URL pattern, `{param}` segments allowed.
    pub url: String,
    /// Methods the route answers.
    pub methods: Vec<Method>,
    /// Version matcher such as `1.0.0`; `None` for path-versioned or
    /// unversioned routes.
    pub version: Option<String>,
    /// The stages run for each request.
    pub pipeline: Arc<Pipeline>,
}

/// Errors raised while registering routes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A route with the same pattern, method and version exists.
    #[error("route {url} (version {}) is already registered", .version.as_deref().unwrap_or("any"))]
    DuplicateRoute {
        /// URL pattern.
        url: String,
        /// Version matcher.
        version: Option<String>,
    },

    /// The version matcher has no numeric major component.
    #[error("invalid version matcher '{value}' for route {url}")]
    InvalidVersion {
        /// URL pattern.
        url: String,
        /// Offending matcher.
        value: String,
    },
}

/// Route registration surface offered to the binder and lifecycle hooks.
pub trait HttpEngine: Send {
    /// Registers a route.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the route conflicts with an existing one
    /// or its version matcher cannot be parsed.
    fn route(&mut self, registration: RouteRegistration) -> Result<(), EngineError>;

    /// Returns every registered route in registration order.
    fn routes(&self) -> &[RouteRegistration];
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Send server-processing messages to clients verbatim.
    pub expose_internal_errors: bool,
    /// Upper bound for one pipeline run.
    pub request_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl EngineSettings {
    /// Derives settings from configuration.
    #[must_use]
    pub fn from_config(config: &BitbeatConfig) -> Self {
        Self {
            expose_internal_errors: config.actions.expose_internal_errors,
            request_timeout: config.server.request_timeout(),
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&BitbeatConfig::default())
    }
}

/// Hyper-facing engine: routes requests into action pipelines.
#[derive(Debug, Default)]
pub struct Engine {
    router: Router,
    registrations: Vec<RouteRegistration>,
    settings: EngineSettings,
}

impl HttpEngine for Engine {
    fn route(&mut self, registration: RouteRegistration) -> Result<(), EngineError> {
        let version = match &registration.version {
            Some(value) => Some(parse_major(value).ok_or_else(|| EngineError::InvalidVersion {
                url: registration.url.clone(),
                value: value.clone(),
            })?),
            None => None,
        };
        if self
            .router
            .conflicts(&registration.methods, &registration.url, version)
        {
            return Err(EngineError::DuplicateRoute {
                url: registration.url,
                version: registration.version,
            });
        }

        info!(
            url = %registration.url,
            methods = ?registration.methods,
            version = registration.version.as_deref().unwrap_or("-"),
            action = registration.pipeline.definition().name(),
            "route registered"
        );
        self.router.add_route(
            &registration.methods,
            &registration.url,
            version,
            self.registrations.len(),
        );
        self.registrations.push(registration);
        Ok(())
    }

    fn routes(&self) -> &[RouteRegistration] {
        &self.registrations
    }
}

impl Engine {
    /// Creates an engine with the given settings.
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            router: Router::new(),
            registrations: Vec::new(),
            settings,
        }
    }

    /// Returns the engine settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Handles one request end to end.
    ///
    /// Routing failures answer `404`/`405`, oversized bodies `413`, a
    /// pipeline that outlives the request timeout `504`. Every response
    /// carries the `x-request-id` header.
    pub async fn dispatch(
        &self,
        request: Request<Bytes>,
        remote: SocketAddr,
        transport: TransportHandle,
    ) -> HttpResponse {
        let started = Instant::now();
        let request_id = RequestId::new();
        let (parts, body) = request.into_parts();

        let accept_version = parts
            .headers
            .get(&ACCEPT_VERSION)
            .and_then(|value| value.to_str().ok());
        let matched = match self
            .router
            .lookup(&parts.method, parts.uri.path(), accept_version)
        {
            RouteLookup::Found(matched) => matched,
            RouteLookup::NotFound => {
                return failure(
                    request_id,
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("no route for {}", parts.uri.path()),
                );
            }
            RouteLookup::MethodNotAllowed => {
                return failure(
                    request_id,
                    StatusCode::METHOD_NOT_ALLOWED,
                    "METHOD_NOT_ALLOWED",
                    format!("{} is not allowed on {}", parts.method, parts.uri.path()),
                );
            }
            RouteLookup::VersionNotFound => {
                return failure(
                    request_id,
                    StatusCode::NOT_FOUND,
                    "VERSION_NOT_FOUND",
                    format!(
                        "no version of {} matches '{}'",
                        parts.uri.path(),
                        accept_version.unwrap_or_default()
                    ),
                );
            }
        };

        if body.len() > self.settings.max_body_bytes {
            return payload_too_large(request_id, self.settings.max_body_bytes);
        }

        let registration = &self.registrations[matched.index()];
        let action = registration.pipeline.definition().name().to_string();

        let sources = match decode_sources(&parts, &body, matched.into_params()) {
            Ok(sources) => sources,
            Err(error) => {
                log_request_error!(request_id, action, error);
                return self.error_response(request_id, &error);
            }
        };

        let mut ctx = RequestContext::builder()
            .request_id(request_id)
            .method(parts.method)
            .uri(parts.uri)
            .headers(parts.headers)
            .remote_addr(remote)
            .raw_body(body)
            .sources(sources)
            .extension(transport)
            .build();

        let outcome = tokio::time::timeout(
            self.settings.request_timeout,
            registration.pipeline.process(&mut ctx),
        )
        .await;

        let response = match outcome {
            Ok(Ok(())) => success(request_id, &mut ctx),
            Ok(Err(error)) => {
                log_request_error!(request_id, action, error);
                self.error_response(request_id, &error)
            }
            Err(_) => {
                warn!(%request_id, %action, "pipeline timed out");
                failure(
                    request_id,
                    StatusCode::GATEWAY_TIMEOUT,
                    "REQUEST_TIMEOUT",
                    format!("request exceeded {:?}", self.settings.request_timeout),
                )
            }
        };

        log_request_complete!(
            request_id,
            action,
            response.status().as_u16(),
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
        );
        response
    }

    fn error_response(&self, request_id: RequestId, error: &ActionError) -> HttpResponse {
        if error.category() == ErrorCategory::ServerProcessing {
            error!(%request_id, code = error.code(), error = %error, "server processing error");
        }
        let envelope =
            error.to_envelope(Some(&request_id.to_string()), self.settings.expose_internal_errors);
        json_response(error.status_code(), &envelope, request_id)
    }
}

/// Splits a request into its parameter sources.
fn decode_sources(
    parts: &http::request::Parts,
    body: &Bytes,
    path: HashMap<String, String>,
) -> Result<ParamSources, ActionError> {
    let mut sources = ParamSources::default();
    sources.path = path
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    if let Some(query) = parts.uri.query() {
        sources.query = decode_form(query.as_bytes())
            .map_err(|e| ActionError::bad_request(format!("invalid query string: {e}")))?;
    }

    if body.is_empty() {
        return Ok(sources);
    }
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.contains("json") {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => sources.body = map,
            Ok(_) => return Err(ActionError::bad_request("JSON body must be an object")),
            Err(e) => return Err(ActionError::bad_request(format!("invalid JSON body: {e}"))),
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        sources.body = decode_form(body)
            .map_err(|e| ActionError::bad_request(format!("invalid form body: {e}")))?;
    }
    Ok(sources)
}

fn decode_form(input: &[u8]) -> Result<Params, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input)?;
    Ok(pairs
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect())
}

fn success(request_id: RequestId, ctx: &mut RequestContext) -> HttpResponse {
    let result = ctx.take_result();
    let parts = std::mem::take(ctx.response_mut());
    let is_json = parts
        .content_type()
        .map_or(true, |content_type| content_type.contains("json"));

    let body = match result {
        Value::String(text) if !is_json => Bytes::from(text),
        other => match serde_json::to_vec(&other) {
            Ok(encoded) => Bytes::from(encoded),
            Err(e) => {
                let error = ActionError::internal_with_source("failed to encode result", e);
                return json_response(
                    error.status_code(),
                    &error.to_envelope(Some(&request_id.to_string()), false),
                    request_id,
                );
            }
        },
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = parts.status;
    *response.headers_mut() = parts.headers;
    if !response.headers().contains_key(CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    stamp(&mut response, request_id);
    response
}

pub(crate) fn failure(
    request_id: RequestId,
    status: StatusCode,
    code: &str,
    message: String,
) -> HttpResponse {
    let envelope = ErrorEnvelope {
        error: ErrorDetail {
            code: code.to_string(),
            message,
            category: ErrorCategory::ClientInput,
            field: None,
        },
        request_id: Some(request_id.to_string()),
    };
    json_response(status, &envelope, request_id)
}

/// Answers `413` for a body over `limit` bytes.
pub(crate) fn payload_too_large(request_id: RequestId, limit: usize) -> HttpResponse {
    failure(
        request_id,
        StatusCode::PAYLOAD_TOO_LARGE,
        "PAYLOAD_TOO_LARGE",
        format!("request body exceeds {limit} bytes"),
    )
}

fn json_response(status: StatusCode, body: &impl Serialize, request_id: RequestId) -> HttpResponse {
    let body = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    stamp(&mut response, request_id);
    response
}

fn stamp(response: &mut HttpResponse, request_id: RequestId) {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}
