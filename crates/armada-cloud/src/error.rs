//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Inventory listing failed: {0}")]
    ListFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;
