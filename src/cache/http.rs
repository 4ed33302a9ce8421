//! HTTP transport for management-plane, SCM and runtime-host calls

use super::error::CacheError;
use anyhow::Context;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Request headers as ordered name/value pairs
pub type Headers = Vec<(String, String)>;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A successful (2xx) response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Parse the body as JSON; an empty body parses as `null`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };

        serde_json::from_str(body).map_err(|e| CacheError::Parse {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

/// reqwest wrapper shared by every cache call
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tfunc/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Send one request; non-2xx statuses become [`CacheError::Status`]
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<String>,
    ) -> Result<HttpResponse, CacheError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| CacheError::Network {
            url: url.to_string(),
            status: 0,
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| CacheError::Network {
            url: url.to_string(),
            status,
            message: e.to_string(),
        })?;

        if !(200..300).contains(&status) {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(CacheError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(HttpResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}

/// Bounded fixed-backoff retry for the legacy polling endpoints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn should_retry(&self, error: &CacheError, retries: u32) -> bool {
        retries < self.max_retries
            && matches!(error, CacheError::Status { status: 500 | 502, .. })
    }
}

/// Run `op`, retrying on 500/502 according to `policy`
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, CacheError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CacheError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if policy.should_retry(&error, retries) => {
                retries += 1;
                tracing::warn!(
                    "Transient failure ({}), retry {}/{}",
                    error,
                    retries,
                    policy.max_retries
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status_error(status: u16) -> CacheError {
        CacheError::Status {
            url: "https://example/legacy".into(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
        assert_eq!(sanitize_for_log("a\nb"), "ab");
    }

    #[test]
    fn test_empty_body_parses_as_null() {
        let response = HttpResponse {
            url: "u".into(),
            status: 204,
            body: String::new(),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_retry_stops_at_bound() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::ZERO,
        };

        let result: Result<(), _> = retry_transient(policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(status_error(502)) }
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(502));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_ignores_other_statuses() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 5,
            backoff: Duration::ZERO,
        };

        let result: Result<(), _> = retry_transient(policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(status_error(404)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
