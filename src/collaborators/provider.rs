//! Model provider collaborator: health probe via model listing plus
//! rate-limit header parsing

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use super::http::{auth_headers, build_client, ensure_success, join_url};
use super::DependencyError;
use crate::config::AuthScheme;

/// One rate-limit budget reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Option<Duration>,
}

impl RateLimitInfo {
    /// Fraction of the budget still available (1.0 when the limit is zero).
    pub fn remaining_ratio(&self) -> f64 {
        if self.limit == 0 {
            1.0
        } else {
            self.remaining as f64 / self.limit as f64
        }
    }
}

/// Result of a side-effect-free provider probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProbe {
    pub latency: Duration,
    pub model_count: usize,
    pub requests: Option<RateLimitInfo>,
    pub tokens: Option<RateLimitInfo>,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// List models (or the cheapest equivalent listing) without spending quota.
    async fn probe(&self) -> Result<ProviderProbe, DependencyError>;
}

/// Parse durations like `"1s"`, `"6m0s"`, `"250ms"`, `"1h2m"` or bare seconds.
pub fn parse_reset_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs));
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let value: f64 = number.parse().ok()?;
        number.clear();
        let unit_secs = match c {
            'h' => 3600.0,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                0.001
            }
            'm' => 60.0,
            's' => 1.0,
            _ => return None,
        };
        total += Duration::from_secs_f64(value * unit_secs);
    }
    if number.is_empty() {
        Some(total)
    } else {
        None
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn rate_limit(headers: &HeaderMap, suffix: &str) -> Option<RateLimitInfo> {
    let limit = header_u64(headers, &format!("x-ratelimit-limit{suffix}"))?;
    let remaining = header_u64(headers, &format!("x-ratelimit-remaining{suffix}"))?;
    let reset_after = headers
        .get(format!("x-ratelimit-reset{suffix}"))
        .and_then(|v| v.to_str().ok())
        .and_then(parse_reset_duration);
    Some(RateLimitInfo {
        limit,
        remaining,
        reset_after,
    })
}

/// Request and token budgets from `x-ratelimit-*` headers.
///
/// Providers without per-dimension headers send a bare `x-ratelimit-limit`,
/// which is treated as the request budget.
pub fn parse_rate_limits(headers: &HeaderMap) -> (Option<RateLimitInfo>, Option<RateLimitInfo>) {
    let requests = rate_limit(headers, "-requests").or_else(|| rate_limit(headers, ""));
    let tokens = rate_limit(headers, "-tokens");
    (requests, tokens)
}

/// Number of listed entries, whatever the provider calls the array.
pub fn count_listing(body: &Value) -> usize {
    if let Some(items) = body.as_array() {
        return items.len();
    }
    ["data", "models", "transcripts", "results"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_array))
        .map_or(0, Vec::len)
}

/// Generic REST provider probed through its listing endpoint.
pub struct HttpModelProvider {
    name: &'static str,
    http: reqwest::Client,
    base_url: String,
    models_path: String,
}

impl HttpModelProvider {
    pub fn new(
        name: &'static str,
        base_url: &str,
        models_path: &str,
        scheme: AuthScheme,
        api_key: &str,
        request_timeout_ms: u64,
    ) -> Result<Self, DependencyError> {
        Ok(Self {
            name,
            http: build_client(request_timeout_ms, auth_headers(scheme, api_key)?)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            models_path: models_path.to_string(),
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn probe(&self) -> Result<ProviderProbe, DependencyError> {
        let started = Instant::now();
        let response = self.http.get(self.url(&self.models_path)).send().await?;
        let response = ensure_success(response).await?;
        let latency = started.elapsed();
        let (requests, tokens) = parse_rate_limits(response.headers());
        let body: Value = response.json().await?;
        tracing::debug!(provider = self.name, latency_ms = latency.as_millis() as u64, "Provider probe ok");
        Ok(ProviderProbe {
            latency,
            model_count: count_listing(&body),
            requests,
            tokens,
        })
    }
}
