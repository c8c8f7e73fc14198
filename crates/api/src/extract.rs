//! Request extractors.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::ApiError;

/// Header carrying the opaque client identifier.
pub const OWNER_HEADER: &str = "x-browser-id";

const MISSING_OWNER: &str =
    "Missing or empty X-Browser-ID header. Generate a UUID and send it with every request.";

/// Opaque identifier of the calling client, taken from `X-Browser-ID`.
///
/// Every workflow and run read or write is scoped to it. Surrounding
/// whitespace is trimmed; a missing or blank header is a 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if owner.is_empty() {
            return Err(ApiError::bad_request(MISSING_OWNER));
        }
        Ok(Self(owner.to_string()))
    }
}

/// `axum::Json` whose rejections use the API's error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection_message(&rejection))),
        }
    }
}

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected request with `Content-Type: application/json`".to_string()
        }
        other => other.body_text(),
    }
}
