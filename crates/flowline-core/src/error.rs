use thiserror::Error;

/// Error taxonomy for the scheduling core.
///
/// Validation and not-found errors are user-correctable and surfaced
/// synchronously before any mutation. Storage and dispatch errors are
/// transient infrastructure failures propagated for upstream retry.
/// Consistency-guard skips (a deferred job finding its entity already past
/// the expected status) are deliberately not errors; they are logged no-ops.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the caller can correct this error by changing the request.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;
