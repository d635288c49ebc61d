//! Request extractors whose rejections use the JSON envelope.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::session::SessionError;

/// [`Path`] for object addresses: a segment that does not parse is an
/// unresolvable target rather than a plain-text 400.
#[derive(Debug)]
pub struct TargetPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for TargetPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| SessionError::InvalidTarget(rejection.body_text()))?;
        Ok(Self(value))
    }
}
