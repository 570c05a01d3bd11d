use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::services::negotiation::AcceptedHeaders;

/// Parses the negotiation headers of the request.
///
/// Never rejects: a malformed field only makes that field unsatisfiable.
impl<S> FromRequestParts<S> for AcceptedHeaders
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(AcceptedHeaders::from_headers(&parts.headers))
    }
}
