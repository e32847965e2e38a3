//! Per-tenant HTTP rate limiting via `tower_governor`, keyed on the
//! caller's `X-Api-Key` instead of source IP (the reference service keys
//! its GraphQL rate limiter on IP; here isolation is per tenant, not per
//! client address). `RATE_LIMIT_WINDOW_MS`/`RATE_LIMIT_MAX_REQUESTS` are
//! translated into the token-bucket shape `tower_governor` expects:
//! burst size equals the request budget, and the refill interval spreads
//! that budget evenly across the window.

use axum::http::Request;
use tower_governor::key_extractor::KeyExtractor;
use tower_governor::GovernorError;

#[derive(Clone)]
pub struct ApiKeyExtractor;

impl KeyExtractor for ApiKeyExtractor {
    type Key = String;

    fn extract<B>(&self, req: &Request<B>) -> Result<Self::Key, GovernorError> {
        req.headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn extracts_the_api_key_header_as_the_rate_limit_bucket() {
        let request = Request::builder().header("x-api-key", "tenant-a").body(Body::empty()).unwrap();
        assert_eq!(ApiKeyExtractor.extract(&request).unwrap(), "tenant-a");
    }

    #[test]
    fn missing_api_key_header_is_rejected() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(ApiKeyExtractor.extract(&request).is_err());
    }
}
