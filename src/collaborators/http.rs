//! Shared HTTP plumbing for REST collaborators

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use std::time::Duration;

use super::DependencyError;
use crate::config::{defaults, AuthScheme};

/// Build a client with JSON accept, the engine's user agent and an optional
/// `Authorization` header.
pub fn build_client(
    timeout_ms: u64,
    mut headers: HeaderMap,
) -> Result<reqwest::Client, DependencyError> {
    headers.insert(USER_AGENT, HeaderValue::from_static(defaults::USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(timeout_ms.max(1)))
        .build()
        .map_err(|e| DependencyError::InvalidResponse(format!("failed to build http client: {e}")))
}

/// `Authorization` header value for `key` under `scheme`.
pub fn auth_header(scheme: AuthScheme, key: &str) -> Result<HeaderValue, DependencyError> {
    let key = key.trim();
    let raw = match scheme {
        AuthScheme::Bearer => format!("Bearer {key}"),
        AuthScheme::Token => format!("Token {key}"),
        AuthScheme::Raw => key.to_string(),
    };
    let mut value = HeaderValue::from_str(&raw)
        .map_err(|_| DependencyError::Unauthorized("credential contains invalid characters".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Headers carrying `key` with the given scheme.
pub fn auth_headers(scheme: AuthScheme, key: &str) -> Result<HeaderMap, DependencyError> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth_header(scheme, key)?);
    Ok(headers)
}

/// Parse `Retry-After` as delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0)))
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

pub fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated: String = body.chars().take(max_chars).collect();
    format!("{truncated}...")
}

/// Map a non-success HTTP status to a dependency error.
pub fn status_error(status: reqwest::StatusCode, headers: &HeaderMap, body: &str) -> DependencyError {
    let body = truncate_for_error(body, 320);
    match status.as_u16() {
        401 | 403 => DependencyError::Unauthorized(format!("status={status} body={body}")),
        404 => DependencyError::NotFound(format!("status={status} body={body}")),
        429 => DependencyError::RateLimited {
            retry_after: parse_retry_after(headers),
        },
        408 | 504 => DependencyError::Timeout,
        code => DependencyError::Api {
            code: code.to_string(),
            message: body,
            retryable: is_retryable_status(code),
        },
    }
}

/// Return the response when successful, otherwise the mapped error.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DependencyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &headers, &body))
}

/// Join a base URL and a path without doubling or dropping slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_parse_retry_after_past_date_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_missing_or_garbage() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_status_mapping() {
        let h = HeaderMap::new();
        assert!(matches!(
            status_error(reqwest::StatusCode::UNAUTHORIZED, &h, ""),
            DependencyError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, &h, ""),
            DependencyError::RateLimited { .. }
        ));
        assert!(status_error(reqwest::StatusCode::BAD_GATEWAY, &h, "").is_retryable());
        assert!(!status_error(reqwest::StatusCode::BAD_REQUEST, &h, "").is_retryable());
    }

    #[test]
    fn test_auth_schemes() {
        assert_eq!(auth_header(AuthScheme::Bearer, "k").unwrap(), "Bearer k");
        assert_eq!(auth_header(AuthScheme::Token, " k ").unwrap(), "Token k");
        assert_eq!(auth_header(AuthScheme::Raw, "k").unwrap(), "k");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://a.b/", "/v1/models"), "https://a.b/v1/models");
        assert_eq!(join_url("https://a.b", "v1"), "https://a.b/v1");
    }

    #[test]
    fn test_truncate_for_error() {
        assert_eq!(truncate_for_error("abc", 5), "abc");
        assert_eq!(truncate_for_error("abcdef", 3), "abc...");
    }
}
