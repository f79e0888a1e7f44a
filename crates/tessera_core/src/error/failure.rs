//! The closed set of failures surfaced by core operations.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Diagnostic payload shared by every [`Failure`] variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureDetail {
    /// Message describing what went wrong. May contain internal detail;
    /// never shown to end users directly.
    pub message: String,
    /// Optional machine-readable code (e.g. `"E_RATE"`, an HTTP status).
    pub code: Option<String>,
    /// Structured context for logs (entity ids, paths, raw bodies).
    pub context: BTreeMap<String, String>,
    /// Originating trace. Only retained in debug builds.
    pub trace: Option<String>,
}

impl FailureDetail {
    /// Creates a detail with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        Ok(())
    }
}

/// Why a write was rejected as a conflict.
///
/// The two causes are resolved differently by the sync engine: only
/// concurrent modifications go through the conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCause {
    /// The remote copy changed since the local copy was read.
    ConcurrentModification,
    /// The write collides with an existing row on a unique key.
    UniqueViolation,
}

impl fmt::Display for ConflictCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictCause::ConcurrentModification => f.write_str("concurrent modification"),
            ConflictCause::UniqueViolation => f.write_str("unique violation"),
        }
    }
}

/// Fieldless discriminant of [`Failure`], for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    /// Connectivity problem.
    Network,
    /// The operation exceeded its deadline.
    Timeout,
    /// The backend failed to process a valid request.
    Server,
    /// Input was rejected.
    Validation,
    /// The addressed entity does not exist.
    NotFound,
    /// The write conflicts with existing state.
    Conflict,
    /// Caller is authenticated but not allowed.
    Forbidden,
    /// Caller is not authenticated.
    Unauthorized,
    /// Caller is being throttled.
    RateLimited,
    /// Local cache or store failure.
    Cache,
    /// Anything else.
    Unexpected,
}

impl FailureKind {
    /// Every kind, in declaration order.
    pub const ALL: [FailureKind; 11] = [
        FailureKind::Network,
        FailureKind::Timeout,
        FailureKind::Server,
        FailureKind::Validation,
        FailureKind::NotFound,
        FailureKind::Conflict,
        FailureKind::Forbidden,
        FailureKind::Unauthorized,
        FailureKind::RateLimited,
        FailureKind::Cache,
        FailureKind::Unexpected,
    ];
}

/// A typed failure.
///
/// This is a closed set: code matching on it is checked for
/// exhaustiveness by the compiler, and every boundary error converts into
/// exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// Connectivity problem (DNS, refused connection, offline).
    #[error("network error: {detail}")]
    Network {
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// The operation exceeded its deadline.
    #[error("timed out: {detail}")]
    Timeout {
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// The backend failed to process a valid request.
    #[error("server error: {detail}")]
    Server {
        /// HTTP status, when the failure came from an HTTP response.
        status: Option<u16>,
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// Input was rejected.
    #[error("validation failed: {detail}")]
    Validation {
        /// Messages per offending field.
        fields: BTreeMap<String, Vec<String>>,
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// The addressed entity does not exist.
    #[error("not found: {detail}")]
    NotFound {
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// The write conflicts with existing state.
    #[error("conflict ({cause}): {detail}")]
    Conflict {
        /// What kind of conflict.
        cause: ConflictCause,
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// Caller is authenticated but not allowed.
    #[error("forbidden: {detail}")]
    Forbidden {
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// Caller is not authenticated.
    #[error("unauthorized: {detail}")]
    Unauthorized {
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// Caller is being throttled.
    #[error("rate limited: {detail}")]
    RateLimited {
        /// Server-provided hint for when to retry.
        retry_after: Option<Duration>,
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// Local cache or store failure.
    #[error("cache error: {detail}")]
    Cache {
        /// Diagnostics.
        detail: FailureDetail,
    },

    /// Anything that doesn't fit the other variants.
    #[error("unexpected error: {detail}")]
    Unexpected {
        /// Diagnostics.
        detail: FailureDetail,
    },
}

impl Failure {
    /// Creates a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a server failure.
    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a validation failure without field messages.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            fields: BTreeMap::new(),
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a validation failure with per-field messages.
    pub fn validation_fields(
        message: impl Into<String>,
        fields: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self::Validation {
            fields,
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a not-found failure.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a conflict failure.
    pub fn conflict(cause: ConflictCause, message: impl Into<String>) -> Self {
        Self::Conflict {
            cause,
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a forbidden failure.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            detail: FailureDetail::new(message),
        }
    }

    /// Creates an unauthorized failure.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a rate-limited failure.
    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            retry_after,
            detail: FailureDetail::new(message),
        }
    }

    /// Creates a cache failure.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            detail: FailureDetail::new(message),
        }
    }

    /// Creates an unexpected failure.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            detail: FailureDetail::new(message),
        }
    }

    /// Returns the fieldless kind of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::Network { .. } => FailureKind::Network,
            Failure::Timeout { .. } => FailureKind::Timeout,
            Failure::Server { .. } => FailureKind::Server,
            Failure::Validation { .. } => FailureKind::Validation,
            Failure::NotFound { .. } => FailureKind::NotFound,
            Failure::Conflict { .. } => FailureKind::Conflict,
            Failure::Forbidden { .. } => FailureKind::Forbidden,
            Failure::Unauthorized { .. } => FailureKind::Unauthorized,
            Failure::RateLimited { .. } => FailureKind::RateLimited,
            Failure::Cache { .. } => FailureKind::Cache,
            Failure::Unexpected { .. } => FailureKind::Unexpected,
        }
    }

    /// Returns the diagnostic payload.
    pub fn detail(&self) -> &FailureDetail {
        match self {
            Failure::Network { detail }
            | Failure::Timeout { detail }
            | Failure::Server { detail, .. }
            | Failure::Validation { detail, .. }
            | Failure::NotFound { detail }
            | Failure::Conflict { detail, .. }
            | Failure::Forbidden { detail }
            | Failure::Unauthorized { detail }
            | Failure::RateLimited { detail, .. }
            | Failure::Cache { detail }
            | Failure::Unexpected { detail } => detail,
        }
    }

    fn detail_mut(&mut self) -> &mut FailureDetail {
        match self {
            Failure::Network { detail }
            | Failure::Timeout { detail }
            | Failure::Server { detail, .. }
            | Failure::Validation { detail, .. }
            | Failure::NotFound { detail }
            | Failure::Conflict { detail, .. }
            | Failure::Forbidden { detail }
            | Failure::Unauthorized { detail }
            | Failure::RateLimited { detail, .. }
            | Failure::Cache { detail }
            | Failure::Unexpected { detail } => detail,
        }
    }

    /// Returns the diagnostic message.
    pub fn message(&self) -> &str {
        &self.detail().message
    }

    /// Returns the machine code, if any.
    pub fn code(&self) -> Option<&str> {
        self.detail().code.as_deref()
    }

    /// Attaches a machine code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.detail_mut().code = Some(code.into());
        self
    }

    /// Attaches a context entry for logs.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail_mut().context.insert(key.into(), value.into());
        self
    }

    /// Attaches an originating trace. Release builds discard it.
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        if cfg!(debug_assertions) {
            self.detail_mut().trace = Some(trace.into());
        }
        self
    }

    /// Returns true for failures worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Network
                | FailureKind::Timeout
                | FailureKind::Server
                | FailureKind::RateLimited
        )
    }

    /// Returns the conflict cause if this is a conflict.
    pub fn conflict_cause(&self) -> Option<ConflictCause> {
        match self {
            Failure::Conflict { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// Returns the text safe to show an end user.
    ///
    /// Never empty. Internal diagnostics (raw server bodies, exception
    /// text, traces) never appear here; only kinds whose messages are
    /// authored for users (validation, not-found, conflict, forbidden)
    /// pass their message through.
    pub fn user_message(&self) -> String {
        let authored = |fallback: &str| {
            let message = self.message().trim();
            if message.is_empty() {
                fallback.to_string()
            } else {
                message.to_string()
            }
        };

        match self {
            Failure::Network { .. } => {
                "Unable to reach the server. Check your connection and try again.".into()
            }
            Failure::Timeout { .. } => "The request took too long. Please try again.".into(),
            Failure::Server { .. } => {
                "The server ran into a problem. Please try again later.".into()
            }
            Failure::Validation { fields, .. } => match fields.values().flatten().next() {
                Some(first) if self.message().trim().is_empty() => first.clone(),
                _ => authored("Some of the information provided is invalid."),
            },
            Failure::NotFound { .. } => authored("The requested item could not be found."),
            Failure::Conflict { .. } => {
                authored("This item was changed elsewhere. Refresh and try again.")
            }
            Failure::Forbidden { .. } => authored("You don't have permission to do that."),
            Failure::Unauthorized { .. } => "Please sign in to continue.".into(),
            Failure::RateLimited { .. } => {
                "Too many requests. Please wait a moment and try again.".into()
            }
            Failure::Cache { .. } => "Local data could not be read or saved.".into(),
            Failure::Unexpected { .. } => "Something went wrong. Please try again.".into(),
        }
    }
}
