//! Error taxonomy shared by every backend.

use thiserror::Error;

/// Why a guarded operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Canceled,
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Canceled => write!(f, "canceled by caller"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Authentication failure. Messages never carry configuration secrets.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unsupported authentication method: {0}")]
    UnsupportedMethod(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("{operation} failed: {message}")]
    Protocol {
        operation: &'static str,
        message: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("identity not found: {0}")]
    NotFound(String),

    #[error("{operation} interrupted: {reason}")]
    Canceled {
        operation: &'static str,
        reason: CancelReason,
    },
}

/// Fieldless mirror of [`AuthError`] for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedMethod,
    Configuration,
    Input,
    Protocol,
    Validation,
    NotFound,
    Canceled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedMethod => "unsupported_method",
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Input => "input_error",
            ErrorKind::Protocol => "protocol_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

impl AuthError {
    pub(crate) fn protocol(operation: &'static str, message: impl std::fmt::Display) -> Self {
        AuthError::Protocol {
            operation,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            AuthError::Configuration(_) => ErrorKind::Configuration,
            AuthError::Input(_) => ErrorKind::Input,
            AuthError::Protocol { .. } => ErrorKind::Protocol,
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Canceled { .. } => ErrorKind::Canceled,
        }
    }

    /// Message suitable for an end user.
    ///
    /// Validation and not-found failures share one message so that a
    /// response cannot be used to probe which accounts exist.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::NotFound => "authentication failed",
            ErrorKind::Input => "missing or malformed credentials",
            ErrorKind::UnsupportedMethod | ErrorKind::Configuration => {
                "authentication method is not available"
            }
            ErrorKind::Protocol => "identity provider unavailable",
            ErrorKind::Canceled => "authentication was interrupted",
        }
    }
}
