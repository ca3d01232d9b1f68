pub mod auth;
pub mod security;

use serde::Serialize;
use utoipa::ToSchema;

/// Wire shape of every error body produced by the service.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "TOO_MANY_REQUESTS")]
    pub code: String,
    #[schema(example = "API token rate limit exceeded. Please retry later.")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
