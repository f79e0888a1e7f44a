//! Boundary errors and their mapping into [`Failure`].

use super::failure::{ConflictCause, Failure, FailureKind};
use std::collections::BTreeMap;
use std::time::Duration;
use tessera_storage::{ConstraintKind, StorageError};
use thiserror::Error;

/// Errors produced by the remote-call interface and by local stores.
///
/// Implementations of [`RemoteCall`](crate::repository::RemoteCall) report
/// their problems through this enum. It is converted into a [`Failure`]
/// before it reaches any caller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend rejected the payload.
    #[error("validation error: {message}")]
    Validation {
        /// Summary.
        message: String,
        /// Messages per offending field.
        fields: BTreeMap<String, Vec<String>>,
    },

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource changed since it was read.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A unique key is already taken.
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    /// A referenced row does not exist.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A required field is missing.
    #[error("not null violation: {field}")]
    NotNullViolation {
        /// The missing field.
        field: String,
    },

    /// Access denied.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Throttled by the backend.
    #[error("rate limited")]
    RateLimited {
        /// Retry hint from the backend.
        retry_after: Option<Duration>,
    },

    /// The call did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A response with a status the caller did not handle.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// A payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A local store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Classifies an HTTP status code into a failure kind.
///
/// Statuses outside the recognised set (including 2xx and 3xx, which are
/// not failures a caller should see here) classify as
/// [`FailureKind::Unexpected`].
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        400 | 422 => FailureKind::Validation,
        401 => FailureKind::Unauthorized,
        403 => FailureKind::Forbidden,
        404 => FailureKind::NotFound,
        408 => FailureKind::Timeout,
        409 => FailureKind::Conflict,
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::Server,
        _ => FailureKind::Unexpected,
    }
}

const DUPLICATE_MESSAGE: &str = "An item with the same identifier already exists.";

fn from_status(status: u16, body: String) -> Failure {
    let message = format!("HTTP {status}");
    let failure = match classify_status(status) {
        FailureKind::Validation => Failure::validation(""),
        FailureKind::Unauthorized => Failure::unauthorized(message),
        FailureKind::Forbidden => Failure::forbidden(""),
        FailureKind::NotFound => Failure::not_found(""),
        FailureKind::Timeout => Failure::timeout(message),
        FailureKind::Conflict => Failure::conflict(ConflictCause::ConcurrentModification, ""),
        FailureKind::RateLimited => Failure::rate_limited(None, message),
        FailureKind::Server => Failure::server(Some(status), message),
        FailureKind::Network | FailureKind::Cache | FailureKind::Unexpected => {
            Failure::unexpected(message)
        }
    };
    let failure = failure.with_code(status.to_string());
    if body.is_empty() {
        failure
    } else {
        failure.with_context("body", body)
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Validation { message, fields } => {
                Failure::validation_fields(message, fields)
            }
            TransportError::NotFound(message) => Failure::not_found(message),
            TransportError::Conflict(message) => {
                Failure::conflict(ConflictCause::ConcurrentModification, "")
                    .with_context("detail", message)
            }
            TransportError::UniqueViolation(message) => {
                Failure::conflict(ConflictCause::UniqueViolation, DUPLICATE_MESSAGE)
                    .with_context("detail", message)
            }
            TransportError::ForeignKeyViolation(message) => {
                Failure::validation("").with_context("detail", message)
            }
            TransportError::NotNullViolation { field } => {
                let mut fields = BTreeMap::new();
                fields.insert(field.clone(), vec![format!("{field} is required.")]);
                Failure::validation_fields("", fields)
            }
            TransportError::Forbidden(message) => Failure::forbidden(message),
            TransportError::Unauthorized(message) => Failure::unauthorized(message),
            TransportError::RateLimited { retry_after } => {
                Failure::rate_limited(retry_after, "rate limited by backend")
            }
            TransportError::Timeout(message) => Failure::timeout(message),
            TransportError::Connection(message) => Failure::network(message),
            TransportError::Http { status, body } => from_status(status, body),
            TransportError::Decode(message) => Failure::unexpected(message).with_code("decode"),
            TransportError::Storage(err) => err.into(),
            TransportError::Other(message) => Failure::unexpected(message),
        }
    }
}

impl From<StorageError> for Failure {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Constraint { kind, key, detail } => match kind {
                ConstraintKind::Unique => Failure::conflict(
                    ConflictCause::UniqueViolation,
                    DUPLICATE_MESSAGE,
                )
                .with_context("key", key)
                .with_context("detail", detail),
                ConstraintKind::NotNull => {
                    let mut fields = BTreeMap::new();
                    fields.insert(key.clone(), vec![format!("{key} is required.")]);
                    Failure::validation_fields("", fields).with_context("detail", detail)
                }
                ConstraintKind::ForeignKey => {
                    Failure::validation(format!("{key} refers to a missing item."))
                        .with_context("detail", detail)
                }
            },
            other => Failure::cache(other.to_string()),
        }
    }
}
