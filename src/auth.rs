use http::header::AUTHORIZATION;

use crate::error::ProxyError;

/// Extract the bearer token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Check a request's bearer token against the single shared admin key.
///
/// Every route in this service — the proxy endpoint and every `/admin/*`
/// route alike — is gated by the same secret; there is no separate
/// credential tier.
///
/// # Errors
/// Returns `ProxyError::Config` when no admin key was configured for the
/// process at all — every request is unauthenticatable and that is a
/// deployment mistake, not a client error. Returns `ProxyError::Auth` when
/// the header is missing or the token does not match a configured key.
pub fn authenticate(headers: &http::HeaderMap, admin_key: &str) -> Result<(), ProxyError> {
    if admin_key.is_empty() {
        return Err(ProxyError::Config("ADMIN_KEY is not configured".to_string()));
    }
    match bearer_token(headers) {
        Some(token) if token == admin_key => Ok(()),
        Some(_) => Err(ProxyError::Auth("invalid API key".to_string())),
        None => Err(ProxyError::Auth("missing API key".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_bearer_token() {
        let mut headers = http::HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        assert!(authenticate(&headers, "secret").is_ok());
    }

    #[test]
    fn rejects_mismatched_token() {
        let mut headers = http::HeaderMap::new();
        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        let err = authenticate(&headers, "secret").unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));
    }

    #[test]
    fn rejects_missing_header() {
        let headers = http::HeaderMap::new();
        let err = authenticate(&headers, "secret").unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));
    }

    #[test]
    fn unconfigured_admin_key_is_a_config_error_not_an_auth_error() {
        let headers = http::HeaderMap::new();
        let err = authenticate(&headers, "").unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unconfigured_admin_key_wins_even_with_a_token_present() {
        let mut headers = http::HeaderMap::new();
        headers.insert("authorization", "Bearer anything".parse().unwrap());
        let err = authenticate(&headers, "").unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }
}
