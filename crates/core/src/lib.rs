//! Shared primitives for all Rust crates in jitgate.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used across jitgate crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create targeted a key that is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Write was based on a stale resource version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No access policy admits the request.
    #[error("policy not matched: {0}")]
    PolicyNotMatched(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Several independent failures collected from one operation.
    #[error("{} errors: {}", .0.len(), join_messages(.0))]
    Joined(Vec<AppError>),
}

impl AppError {
    /// Returns true for [`AppError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for [`AppError::AlreadyExists`].
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns true for [`AppError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Folds collected errors into one result.
    ///
    /// An empty list is success, a single error is returned as-is and
    /// anything more becomes [`AppError::Joined`].
    pub fn join(mut errors: Vec<AppError>) -> AppResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Joined(errors)),
        }
    }
}

fn join_messages(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Treats a missing object as the desired end state.
pub fn ignore_not_found<T>(result: AppResult<T>) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_not_found() => Ok(None),
        Err(error) => Err(error),
    }
}

/// Treats an existing object as a successful create.
///
/// Returns `true` when the create actually happened.
pub fn ignore_already_exists<T>(result: AppResult<T>) -> AppResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(error) if error.is_already_exists() => Ok(false),
        Err(error) => Err(error),
    }
}
