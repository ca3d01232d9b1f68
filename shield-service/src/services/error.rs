use service_core::error::AppError;
use thiserror::Error;

/// Failures raised by the verification pipeline. Only the HTTP boundary
/// translates these into wire-level status codes.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid API token")]
    InvalidApiToken,

    #[error("Account is deactivated")]
    AccountDisabled,

    #[error("Membership is not active")]
    MembershipInactive,

    #[error("API token rate limit exceeded")]
    RateLimited,

    #[error("Not found")]
    NotFound,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::Unauthorized => {
                AppError::Unauthorized(anyhow::anyhow!("Missing or invalid credentials"))
            }
            ServiceError::InvalidRefreshToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            ServiceError::InvalidApiToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid API token"))
            }
            ServiceError::AccountDisabled => {
                AppError::Forbidden(anyhow::anyhow!("Account is deactivated"))
            }
            ServiceError::MembershipInactive => {
                AppError::Forbidden(anyhow::anyhow!("Membership is not active"))
            }
            ServiceError::RateLimited => AppError::TooManyRequests(
                "API token rate limit exceeded. Please retry later.".to_string(),
                None,
            ),
            ServiceError::NotFound => AppError::NotFound(anyhow::anyhow!("Not found")),
        }
    }
}
