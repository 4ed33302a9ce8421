//! Access tokens
//!
//! Resolves bearer tokens for management-plane and SCM calls. Tokens come from
//! a [`TokenSource`] and are cached with an expiry, so every caller of
//! [`Credentials::get_token`] shares one token until it is about to expire.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Environment variable holding a pre-issued access token
pub const TOKEN_ENV_VAR: &str = "TFUNC_ACCESS_TOKEN";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Something that can hand out an access token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A token supplied up front (CLI flag, tests)
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// A token read from an environment variable on every refresh
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl TokenSource for EnvToken {
    async fn token(&self) -> Result<String> {
        let token = std::env::var(&self.var)
            .with_context(|| format!("No access token found. Set {} or pass --token", self.var))?;

        if token.trim().is_empty() {
            return Err(anyhow::anyhow!("{} is set but empty", self.var));
        }

        Ok(token.trim().to_string())
    }
}

/// Session credentials with token caching
#[derive(Clone)]
pub struct Credentials {
    source: Arc<dyn TokenSource>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl Credentials {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn from_static(token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticToken::new(token)))
    }

    /// Credentials backed by [`TOKEN_ENV_VAR`]
    pub fn from_env() -> Self {
        Self::new(Arc::new(EnvToken::new(TOKEN_ENV_VAR)))
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .source
            .token()
            .await
            .context("Failed to get access token")?;

        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn token(&self) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{}", n))
        }
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let credentials = Credentials::new(source.clone());

        assert_eq!(credentials.get_token().await.unwrap(), "token-0");
        assert_eq!(credentials.get_token().await.unwrap(), "token-0");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // clones share the cached token
        assert_eq!(credentials.clone().get_token().await.unwrap(), "token-0");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_env_token_is_an_error() {
        let credentials = Credentials::new(Arc::new(EnvToken::new("TFUNC_TEST_TOKEN_NOT_SET")));
        let err = credentials.get_token().await.unwrap_err();
        assert!(format!("{:#}", err).contains("TFUNC_TEST_TOKEN_NOT_SET"));
    }
}
