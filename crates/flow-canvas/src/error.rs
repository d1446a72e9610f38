//! Error types for the canvas engine

use thiserror::Error;

/// Result type alias using CanvasError
pub type Result<T> = std::result::Result<T, CanvasError>;

/// Failure categories reported by the flow collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// The requested entity does not exist
    NotFound,
    /// The submitted revision is outdated
    Conflict,
    /// A bounded id space is exhausted
    CapacityExceeded,
    /// The caller lacks read or write permission
    PermissionDenied,
    /// The request failed before the collaborator answered
    TransientNetwork,
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotFound => "Not found",
            Self::Conflict => "Revision conflict",
            Self::CapacityExceeded => "Capacity exceeded",
            Self::PermissionDenied => "Permission denied",
            Self::TransientNetwork => "Network error",
        };
        f.write_str(label)
    }
}

/// Error returned by a `FlowApi` call
///
/// `prevent_default` is set when a lower layer already surfaced the failure
/// to the user, so the canvas must not show a second dialog for it.
/// `client_error` marks local validation failures that are never retried.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub prevent_default: bool,
    pub client_error: bool,
}

impl ApiError {
    /// Create an error of the given kind
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            prevent_default: false,
            client_error: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Conflict, message)
    }

    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::CapacityExceeded, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::PermissionDenied, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::TransientNetwork, message)
    }

    /// Mark this error as already reported to the user
    pub fn already_reported(mut self) -> Self {
        self.prevent_default = true;
        self
    }

    /// Mark this error as a local validation failure
    pub fn client_side(mut self) -> Self {
        self.client_error = true;
        self
    }

    /// Whether retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        !self.client_error && self.kind == ApiErrorKind::TransientNetwork
    }
}

/// Errors that can occur in the canvas engine
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Error from the flow collaborator
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The id is not known to any entity manager
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// A write was attempted on a component without write permission
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A self-loop must keep at least two bend points
    #[error("Connection '{connection_id}' is a self-loop and must keep at least two bend points")]
    SelfLoopBendFloor { connection_id: String },

    /// A connection endpoint was dropped somewhere it cannot attach
    #[error("Invalid drop target: {0}")]
    InvalidDropTarget(String),

    /// The host did not provide a handler for this operation
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// The canvas is not in a state that allows the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CanvasError {
    /// Create a permission denied error with a message
    pub fn denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Whether the failure was already surfaced by a lower layer
    pub fn prevent_default(&self) -> bool {
        matches!(self, Self::Api(e) if e.prevent_default)
    }

    /// The collaborator error kind, if this came from the collaborator
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::Api(e) => Some(e.kind),
            _ => None,
        }
    }
}
