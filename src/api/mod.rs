//! Axum HTTP surface. Thin by policy: handlers validate, delegate to the
//! queue or the pipeline, and translate errors into JSON envelopes.

pub mod ask;
pub mod jobs;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::Error;

/// The authenticated user, as established by the upstream auth middleware.
///
/// Authentication itself is out of scope here: the gateway validates the
/// bearer token and forwards the subject in `x-user-id`. A request that
/// reaches us without it is a deployment error, not an anonymous user.
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| AuthUser(v.to_string()))
            .ok_or_else(|| Error::InvalidInput("missing authenticated user".to_string()))
    }
}
