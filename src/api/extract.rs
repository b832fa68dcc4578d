//! `Json` and `Path` extractors whose failures render like every other
//! error, as a 400 with an `{"error": ...}` body.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON request body
pub struct RequestJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for RequestJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Path parameters
pub struct Path<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) =
            axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Parse a body that may be left empty; an empty body yields `T::default()`
/// but anything else must be valid JSON for `T`.
pub fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EnrollRequest;

    #[test]
    fn test_optional_json() {
        let empty: EnrollRequest = optional_json(b"").unwrap();
        assert!(empty.user_id.is_none());
        let blank: EnrollRequest = optional_json(b"  \n").unwrap();
        assert!(blank.user_id.is_none());

        let other: EnrollRequest = optional_json(br#"{"user_id": "bob"}"#).unwrap();
        assert_eq!(other.user_id.as_deref(), Some("bob"));

        let err = optional_json::<EnrollRequest>(br#"{"user_id": 42}"#).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
