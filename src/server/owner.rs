use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const HEADER_USER_ID: &str = "X-User-Id";
pub const ANONYMOUS_OWNER: &str = "anonymous";

const MAX_USER_ID_LENGTH: usize = 128;

/// Owner of the request, as asserted by the authenticating proxy in front of
/// this server. Falls back to [`ANONYMOUS_OWNER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_parts(parts: &Parts) -> Owner {
        let id = parts
            .headers
            .get(HEADER_USER_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_USER_ID_LENGTH)
            .unwrap_or(ANONYMOUS_OWNER);
        Owner(id.to_string())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Owner::from_parts(parts))
    }
}
