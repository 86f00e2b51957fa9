//! Error types for Memo Mingle
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized to the view layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Please sign in to continue")]
    AuthorizationRequired,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// True for errors raised before any store round-trip.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    /// True for failures reported by the document store itself.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_)
                | AppError::PermissionDenied(_)
                | AppError::Unavailable(_)
                | AppError::Database(_)
                | AppError::Serialization(_)
        )
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
