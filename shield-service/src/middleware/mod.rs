mod auth;
mod scope_auth;

pub use auth::{classify_credential, credential_guard, AnyAuth, AuthUser, CredentialKind};
pub use scope_auth::require_scope;
