//! Common error types for heardlive

use std::fmt;
use thiserror::Error;

/// Common result type for heardlive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Store error code for a unique constraint violation
pub const UNIQUE_VIOLATION: &str = "23505";

/// Store error code for a check constraint violation
pub const CHECK_VIOLATION: &str = "23514";

/// Profile column holding the handle; its constraints are named after it
const HANDLE_COLUMN: &str = "username";

/// External collaborators whose failures are reported independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalService {
    Catalog,
    Identity,
    DataStore,
    Storage,
}

impl fmt::Display for ExternalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExternalService::Catalog => "catalog",
            ExternalService::Identity => "identity provider",
            ExternalService::DataStore => "data store",
            ExternalService::Storage => "object storage",
        };
        f.write_str(name)
    }
}

/// Common error types across heardlive
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP failure talking to an external service
    #[error("{service} error: {message}")]
    Service {
        service: ExternalService,
        message: String,
    },

    /// Constraint violation reported by the data store
    #[error("Constraint violation {code}: {message}")]
    Constraint { code: String, message: String },

    /// Requested handle already belongs to someone else
    #[error("Handle already taken: {0}")]
    HandleTaken(String),

    /// Handle rejected by the handle rules
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Action requires a signed-in session
    #[error("Not signed in")]
    Unauthenticated,

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn service(service: ExternalService, message: impl Into<String>) -> Self {
        Error::Service {
            service,
            message: message.into(),
        }
    }

    /// True for a store-reported unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::Constraint { code, .. } if code == UNIQUE_VIOLATION)
    }

    /// True for a store-reported check constraint violation
    pub fn is_check_violation(&self) -> bool {
        matches!(self, Error::Constraint { code, .. } if code == CHECK_VIOLATION)
    }

    /// True when the violated constraint is one on the handle column
    fn on_handle_constraint(&self) -> bool {
        matches!(self, Error::Constraint { message, .. } if message.contains(HANDLE_COLUMN))
    }

    /// Translate store conflicts on a handle write into handle errors
    ///
    /// The store's constraints are the authority on handle uniqueness, so
    /// a conflict on the handle column is reported against `handle`.
    /// Other conflicts (such as a duplicate primary key) and all other
    /// errors pass through unchanged.
    pub fn for_handle(self, handle: &str) -> Self {
        if !self.on_handle_constraint() {
            self
        } else if self.is_unique_violation() {
            Error::HandleTaken(handle.to_string())
        } else if self.is_check_violation() {
            Error::InvalidHandle(handle.to_string())
        } else {
            self
        }
    }

    /// Message suitable for a transient notification
    pub fn user_message(&self) -> String {
        match self {
            Error::Service { service, .. } => {
                format!("Could not reach the {}. Please try again.", service)
            }
            Error::Constraint { .. } => {
                "That change conflicts with existing data.".to_string()
            }
            Error::HandleTaken(handle) => format!("The handle @{} is already taken", handle),
            Error::InvalidHandle(_) => {
                "Handles may only contain lowercase letters, numbers and underscores".to_string()
            }
            Error::NotFound(what) => format!("{} not found", what),
            Error::InvalidInput(msg) => msg.clone(),
            Error::Unauthenticated => "Please sign in first".to_string(),
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_becomes_handle_taken() {
        let err = Error::Constraint {
            code: UNIQUE_VIOLATION.to_string(),
            message: "duplicate key value violates unique constraint \"profiles_username_key\""
                .to_string(),
        };
        match err.for_handle("daft_fan") {
            Error::HandleTaken(handle) => assert_eq!(handle, "daft_fan"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_primary_key_conflict_is_not_a_taken_handle() {
        let err = Error::Constraint {
            code: UNIQUE_VIOLATION.to_string(),
            message: "duplicate key value violates unique constraint \"profiles_pkey\""
                .to_string(),
        };
        match err.for_handle("daft_fan") {
            Error::Constraint { code, message } => {
                assert_eq!(code, UNIQUE_VIOLATION);
                assert!(message.contains("profiles_pkey"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_violation_becomes_invalid_handle() {
        let err = Error::Constraint {
            code: CHECK_VIOLATION.to_string(),
            message: "new row violates check constraint \"username_format\"".to_string(),
        };
        assert!(matches!(err.for_handle("x"), Error::InvalidHandle(_)));
    }

    #[test]
    fn test_other_errors_pass_through_handle_translation() {
        let err = Error::service(ExternalService::DataStore, "timeout");
        assert!(matches!(err.for_handle("x"), Error::Service { .. }));
    }

    #[test]
    fn test_user_message_names_the_service() {
        let err = Error::service(ExternalService::Catalog, "connection refused");
        assert!(err.user_message().contains("catalog"));
        assert!(!err.user_message().contains("refused"));
    }
}
