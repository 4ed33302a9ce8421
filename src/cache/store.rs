//! TTL-backed resource cache over [`HttpTransport`]

use super::http::{Headers, HttpResponse, HttpTransport};
use super::{CacheError, ResourceCache};
use crate::arm::Credentials;
use async_trait::async_trait;
use reqwest::Method;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Management-plane API version used when a call does not name one
pub const DEFAULT_API_VERSION: &str = "2016-08-01";

/// Default time a cached response stays fresh
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    method: Method,
    url: String,
}

#[derive(Clone)]
struct CachedResponse {
    response: HttpResponse,
    expires_at: Instant,
}

impl CachedResponse {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Parent collection of a resource URL, query dropped
///
/// `https://scm/api/functions/A` lists under `https://scm/api/functions`.
/// A URL whose parent would be the bare host has none.
fn parent_url(url: &str) -> Option<&str> {
    let path = without_query(url).trim_end_matches('/');
    let host_start = path.find("://").map(|i| i + 3).unwrap_or(0);
    let (parent, _) = path.rsplit_once('/')?;
    (parent.len() > host_start && parent[host_start..].contains('/')).then_some(parent)
}

fn without_query(url: &str) -> &str {
    url.split_once('?').map(|(path, _)| path).unwrap_or(url)
}

/// Resource cache backed by reqwest
///
/// GET and HEAD responses, and management-plane POSTs (the `list` endpoints),
/// are cached by method and URL. Any other request is a write: once it
/// succeeds it invalidates every entry under its URL and the listing of its
/// parent collection.
pub struct HttpResourceCache {
    transport: HttpTransport,
    credentials: Credentials,
    arm_endpoint: String,
    api_version: String,
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CachedResponse>>,
}

impl HttpResourceCache {
    pub fn new(
        transport: HttpTransport,
        credentials: Credentials,
        arm_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            arm_endpoint: arm_endpoint.into().trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            ttl: DEFAULT_CACHE_TTL,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Build the management-plane URL for a resource id
    pub fn arm_url(
        &self,
        resource_id: &str,
        api_version: Option<&str>,
    ) -> Result<String, CacheError> {
        let raw = format!("{}{}", self.arm_endpoint, resource_id);
        let mut url = url::Url::parse(&raw)
            .map_err(|e| CacheError::Request(format!("invalid resource url {}: {}", raw, e)))?;
        url.query_pairs_mut()
            .append_pair("api-version", api_version.unwrap_or(&self.api_version));
        Ok(url.to_string())
    }

    async fn lookup(&self, key: &CacheKey) -> Option<HttpResponse> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|cached| cached.is_fresh())
            .map(|cached| cached.response.clone())
    }

    async fn store(&self, key: CacheKey, response: &HttpResponse) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CachedResponse {
                response: response.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn dispatch(
        &self,
        key: CacheKey,
        cacheable: bool,
        force: bool,
        invalidate_prefix: &str,
        headers: Headers,
        body: Option<String>,
    ) -> Result<HttpResponse, CacheError> {
        if cacheable && !force {
            if let Some(hit) = self.lookup(&key).await {
                tracing::debug!("cache hit: {} {}", key.method, key.url);
                return Ok(hit);
            }
        }

        let response = self
            .transport
            .send(key.method.clone(), &key.url, &headers, body)
            .await?;

        if cacheable {
            self.store(key, &response).await;
        } else {
            self.invalidate_write(invalidate_prefix).await;
        }

        Ok(response)
    }

    async fn invalidate_write(&self, url: &str) {
        self.clear_cache_prefix(url).await;

        let Some(parent) = parent_url(url) else {
            return;
        };
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| without_query(&key.url).trim_end_matches('/') != parent);
        if entries.len() < before {
            tracing::debug!("cleared cached listing {}", parent);
        }
    }
}

#[async_trait]
impl ResourceCache for HttpResourceCache {
    async fn send(
        &self,
        method: Method,
        url: &str,
        force: bool,
        headers: Headers,
        body: Option<String>,
    ) -> Result<HttpResponse, CacheError> {
        let cacheable = method == Method::GET || method == Method::HEAD;
        let key = CacheKey {
            method,
            url: url.to_string(),
        };
        self.dispatch(key, cacheable, force, url, headers, body).await
    }

    async fn send_arm(
        &self,
        method: Method,
        resource_id: &str,
        api_version: Option<&str>,
        force: bool,
        body: Option<String>,
    ) -> Result<HttpResponse, CacheError> {
        let url = self.arm_url(resource_id, api_version)?;
        let token = self
            .credentials
            .get_token()
            .await
            .map_err(|e| CacheError::Auth(format!("{:#}", e)))?;

        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", token)),
            (
                "x-ms-client-request-id".to_string(),
                uuid::Uuid::new_v4().to_string(),
            ),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let cacheable = method == Method::GET || method == Method::POST;
        let invalidate_prefix = format!("{}{}", self.arm_endpoint, resource_id);
        let key = CacheKey { method, url };
        self.dispatch(key, cacheable, force, &invalidate_prefix, headers, body)
            .await
    }

    async fn clear_cache_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.url.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("cleared {} cached entries under {}", removed, prefix);
        }
    }
}
