//! Error types for bitbeat.
//!
//! Every pipeline stage fails with an [`ActionError`]. Errors fall into three
//! categories, each mapped to a response class:
//!
//! | `ErrorCategory` | Status | Raised by |
//! |---|---|---|
//! | `ClientInput` | 400 | missing/mistyped input, validator rejection, accept mismatch |
//! | `ServerProcessing` | 500 | formatter failure, missing required output, internal faults |
//! | `ConnectionRejected` | 403 | a connection `before_create` hook failing |
//!
//! Server-processing messages may be hidden from clients, see
//! [`ActionError::to_envelope`].

use crate::schema::FieldType;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ActionError`].
pub type ActionResult<T> = Result<T, ActionError>;

/// Message sent in place of server-processing errors when they are not exposed.
const SANITIZED_MESSAGE: &str = "Internal server error";

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The client sent something the action cannot accept.
    ClientInput,
    /// The server failed while processing a well-formed request.
    ServerProcessing,
    /// A connection hook refused the client.
    ConnectionRejected,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::ClientInput => StatusCode::BAD_REQUEST,
            Self::ServerProcessing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConnectionRejected => StatusCode::FORBIDDEN,
        }
    }
}

/// Standard error type for the action pipeline.
///
/// # Example
///
/// ```
/// use bitbeat_core::{ActionError, ErrorCategory};
///
/// let error = ActionError::missing_input("name");
/// assert_eq!(error.category(), ErrorCategory::ClientInput);
/// assert_eq!(error.code(), "MISSING_REQUIRED_INPUT");
/// ```
#[derive(Error, Debug)]
pub enum ActionError {
    /// A required input was absent and had no default.
    #[error("Missing required input: {field}")]
    MissingRequiredInput {
        /// Name of the input field.
        field: String,
    },

    /// An input value had the wrong runtime type.
    #[error("Input '{field}' must be of type {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the input field.
        field: String,
        /// Declared type.
        expected: FieldType,
        /// Type of the received value.
        actual: FieldType,
    },

    /// A field validator rejected the value.
    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed {
        /// Name of the input field.
        field: String,
        /// Message returned by the validator.
        message: String,
    },

    /// The client does not accept the action's content type.
    #[error("Content type {content_type} is not accepted (accept: {accept})")]
    AcceptTypeMismatch {
        /// Value of the request's accept header.
        accept: String,
        /// Content type the action produces.
        content_type: String,
    },

    /// The request could not be interpreted.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
    },

    /// A field formatter failed on an already validated value.
    #[error("Formatting failed for '{field}': {message}")]
    FormatFailed {
        /// Name of the input field.
        field: String,
        /// Message returned by the formatter.
        message: String,
    },

    /// A required output was absent from the action's result.
    #[error("Missing required output: {field}")]
    MissingRequiredOutput {
        /// Name of the output field.
        field: String,
    },

    /// Internal server error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A connection hook refused to admit the client.
    #[error("Connection rejected: {message}")]
    ConnectionRejected {
        /// Human-readable error message.
        message: String,
    },
}

impl ActionError {
    /// Creates a missing required input error.
    #[must_use]
    pub fn missing_input(field: impl Into<String>) -> Self {
        Self::MissingRequiredInput {
            field: field.into(),
        }
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(field: impl Into<String>, expected: FieldType, actual: FieldType) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
            actual,
        }
    }

    /// Creates a validation failure.
    #[must_use]
    pub fn validation_failed(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an accept type mismatch error.
    #[must_use]
    pub fn accept_mismatch(accept: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::AcceptTypeMismatch {
            accept: accept.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a formatter failure.
    #[must_use]
    pub fn format_failed(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FormatFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a missing required output error.
    #[must_use]
    pub fn missing_output(field: impl Into<String>) -> Self {
        Self::MissingRequiredOutput {
            field: field.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a connection rejection.
    #[must_use]
    pub fn connection_rejected(message: impl Into<String>) -> Self {
        Self::ConnectionRejected {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingRequiredInput { .. }
            | Self::TypeMismatch { .. }
            | Self::ValidationFailed { .. }
            | Self::AcceptTypeMismatch { .. }
            | Self::BadRequest { .. } => ErrorCategory::ClientInput,
            Self::FormatFailed { .. }
            | Self::MissingRequiredOutput { .. }
            | Self::Internal { .. } => ErrorCategory::ServerProcessing,
            Self::ConnectionRejected { .. } => ErrorCategory::ConnectionRejected,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredInput { .. } => "MISSING_REQUIRED_INPUT",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::AcceptTypeMismatch { .. } => "ACCEPT_TYPE_MISMATCH",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::FormatFailed { .. } => "FORMAT_FAILED",
            Self::MissingRequiredOutput { .. } => "MISSING_REQUIRED_OUTPUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::ConnectionRejected { .. } => "CONNECTION_REJECTED",
        }
    }

    /// Returns the field this error is about, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredInput { field }
            | Self::TypeMismatch { field, .. }
            | Self::ValidationFailed { field, .. }
            | Self::FormatFailed { field, .. }
            | Self::MissingRequiredOutput { field } => Some(field),
            _ => None,
        }
    }

    /// Converts this error to a serializable error envelope.
    ///
    /// Server-processing messages are replaced with a generic message
    /// unless `expose_internal` is set; the field name is hidden along with
    /// them.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>, expose_internal: bool) -> ErrorEnvelope {
        let sanitize =
            !expose_internal && self.category() == ErrorCategory::ServerProcessing;
        let (message, field) = if sanitize {
            (SANITIZED_MESSAGE.to_string(), None)
        } else {
            (self.to_string(), self.field().map(ToString::to_string))
        };

        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                category: self.category(),
                field,
            },
            request_id: request_id.map(ToString::to_string),
        }
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Offending field, when the error concerns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_input_errors() {
        let errors = [
            ActionError::missing_input("name"),
            ActionError::type_mismatch("count", FieldType::Number, FieldType::String),
            ActionError::validation_failed("email", "not an email"),
            ActionError::accept_mismatch("text/html", "application/json"),
            ActionError::bad_request("body must be an object"),
        ];
        for error in errors {
            assert_eq!(error.category(), ErrorCategory::ClientInput);
            assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_server_processing_errors() {
        let errors = [
            ActionError::format_failed("name", "boom"),
            ActionError::missing_output("token"),
            ActionError::internal("database unavailable"),
        ];
        for error in errors {
            assert_eq!(error.category(), ErrorCategory::ServerProcessing);
            assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_connection_rejected() {
        let error = ActionError::connection_rejected("banned");
        assert_eq!(error.category(), ErrorCategory::ConnectionRejected);
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(error.code(), "CONNECTION_REJECTED");
    }

    #[test]
    fn test_type_mismatch_message() {
        let error = ActionError::type_mismatch("count", FieldType::Number, FieldType::String);
        assert_eq!(
            error.to_string(),
            "Input 'count' must be of type number, got string"
        );
        assert_eq!(error.field(), Some("count"));
    }

    #[test]
    fn test_envelope_keeps_client_messages() {
        let error = ActionError::missing_input("name");
        let envelope = error.to_envelope(Some("req-1"), false);
        assert_eq!(envelope.error.code, "MISSING_REQUIRED_INPUT");
        assert_eq!(envelope.error.field.as_deref(), Some("name"));
        assert!(envelope.error.message.contains("name"));
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_envelope_sanitizes_server_messages() {
        let error = ActionError::internal_with_source(
            "pool exhausted",
            anyhow::anyhow!("connection refused"),
        );
        let hidden = error.to_envelope(None, false);
        assert_eq!(hidden.error.message, "Internal server error");
        assert_eq!(hidden.error.code, "INTERNAL_ERROR");

        let shown = error.to_envelope(None, true);
        assert!(shown.error.message.contains("pool exhausted"));
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = ActionError::missing_output("token").to_envelope(Some("abc"), true);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["code"], "MISSING_REQUIRED_OUTPUT");
        assert_eq!(json["error"]["category"], "server_processing");
        assert_eq!(json["error"]["field"], "token");
        assert_eq!(json["requestId"], "abc");
    }

    #[test]
    fn test_internal_error_source() {
        use std::error::Error as _;
        let error = ActionError::internal_with_source("failed", anyhow::anyhow!("root cause"));
        assert!(error.source().is_some());
        assert!(ActionError::internal("failed").source().is_none());
    }
}
