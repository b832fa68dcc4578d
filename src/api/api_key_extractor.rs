use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::api::handlers::AppState;
use crate::api::user_extractor::extract_header_value;
use crate::error::AppError;
use crate::logic::{ApiKeyOperations, RateLimitOperations};
use crate::model::{ApiKey, EffectiveRateLimit};
use crate::store::traits::Store;

/// An authenticated API key whose request has been counted against its
/// organization's rate limits.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    pub api_key: ApiKey,
    pub limits: EffectiveRateLimit,
}

/// `Authorization: Bearer <key>` wins over `X-Api-Key`
fn presented_key(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());
    bearer.or_else(|| extract_header_value(headers, "x-api-key"))
}

#[async_trait]
impl<S> FromRequestParts<AppState<S>> for ApiKeyAuth
where
    S: Store + 'static,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let key = presented_key(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Missing API key"))?;

        let api_key = ApiKeyOperations::authenticate(&state.store, &key).await?;
        let limits = RateLimitOperations::check_and_record(
            &state.store,
            &api_key,
            &state.config.rate_limit,
            chrono::Utc::now(),
        )
        .await?;

        Ok(ApiKeyAuth { api_key, limits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_presented_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert("x-api-key", HeaderValue::from_static("lk_from_header"));
        assert_eq!(presented_key(&headers).as_deref(), Some("lk_from_header"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer lk_from_bearer"));
        assert_eq!(presented_key(&headers).as_deref(), Some("lk_from_bearer"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_key(&headers).as_deref(), Some("lk_from_header"));
    }
}
