use thiserror::Error;

use crate::models::CodeRejection;

/// Message shown to the terminal operator for failures they cannot fix themselves.
pub const TRY_AGAIN: &str = "Something went wrong. Check your connection and try again.";

#[derive(Debug, Error)]
pub enum PosError {
    #[error("{0}")]
    Validation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Deliberately identical for unknown email and wrong password.
    #[error("Wrong email or password")]
    InvalidCredentials,

    #[error("Account locked. Try again in {remaining_minutes} minute(s)")]
    AccountLocked { remaining_minutes: i64 },

    #[error("{0}")]
    Code(CodeRejection),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file error: {0}")]
    SessionFile(std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PosError {
    /// Text safe to display at a terminal. Backend failures never leak their
    /// underlying error text.
    pub fn user_message(&self) -> String {
        match self {
            PosError::Storage(_)
            | PosError::Io(_)
            | PosError::SessionFile(_)
            | PosError::Serialization(_)
            | PosError::Crypto(_) => TRY_AGAIN.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether re-submitting the same action unchanged could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PosError::Storage(_) | PosError::Io(_) | PosError::SessionFile(_)
        )
    }
}

impl From<CodeRejection> for PosError {
    fn from(reason: CodeRejection) -> Self {
        PosError::Code(reason)
    }
}

pub type PosResult<T> = Result<T, PosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_masked_for_users() {
        let err = PosError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.user_message(), TRY_AGAIN);
        assert!(err.is_transient());
    }

    #[test]
    fn state_errors_are_shown_verbatim() {
        let err = PosError::AccountLocked {
            remaining_minutes: 12,
        };
        assert_eq!(
            err.user_message(),
            "Account locked. Try again in 12 minute(s)"
        );

        let err = PosError::from(CodeRejection::Exhausted);
        assert_eq!(err.user_message(), "Access code has reached maximum uses");
        assert!(!err.is_transient());
    }
}
