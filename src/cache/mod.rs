//! Resource cache
//!
//! Keyed read-through/write-through cache over the HTTP resource API. Every
//! network call of the console goes through a [`ResourceCache`].
//!
//! # Architecture
//!
//! - [`error`] - [`CacheError`] and HTTP status texts
//! - [`http`] - reqwest transport, response type and the legacy retry policy
//! - [`store`] - [`HttpResourceCache`], the TTL-backed implementation
//!
//! # Example
//!
//! ```ignore
//! use tfunc::cache::{bearer_headers, ResourceCache};
//!
//! async fn body(cache: &dyn ResourceCache, url: &str, token: &str) -> anyhow::Result<String> {
//!     let response = cache.get(url, false, bearer_headers(token, &[])).await?;
//!     Ok(response.body)
//! }
//! ```

pub mod error;
pub mod http;
pub mod store;

use async_trait::async_trait;
use reqwest::Method;

pub use error::{status_code_to_text, CacheError};
pub use http::{retry_transient, Headers, HttpResponse, HttpTransport, RetryPolicy};
pub use store::HttpResourceCache;

/// Read-through/write-through access to the resource API
///
/// Reads with `force == false` may be served from the cache. Writes go
/// straight to the API and invalidate the cached entries under their URL.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    /// Send a request to an absolute URL
    async fn send(
        &self,
        method: Method,
        url: &str,
        force: bool,
        headers: Headers,
        body: Option<String>,
    ) -> Result<HttpResponse, CacheError>;

    /// Send a management-plane request for a resource id
    async fn send_arm(
        &self,
        method: Method,
        resource_id: &str,
        api_version: Option<&str>,
        force: bool,
        body: Option<String>,
    ) -> Result<HttpResponse, CacheError>;

    /// Drop every cached entry whose URL starts with `prefix`
    async fn clear_cache_prefix(&self, prefix: &str);

    async fn get(
        &self,
        url: &str,
        force: bool,
        headers: Headers,
    ) -> Result<HttpResponse, CacheError> {
        self.send(Method::GET, url, force, headers, None).await
    }

    async fn head(
        &self,
        url: &str,
        force: bool,
        headers: Headers,
    ) -> Result<HttpResponse, CacheError> {
        self.send(Method::HEAD, url, force, headers, None).await
    }

    async fn post(
        &self,
        url: &str,
        force: bool,
        headers: Headers,
        body: Option<String>,
    ) -> Result<HttpResponse, CacheError> {
        self.send(Method::POST, url, force, headers, body).await
    }

    async fn put(
        &self,
        url: &str,
        headers: Headers,
        body: String,
    ) -> Result<HttpResponse, CacheError> {
        self.send(Method::PUT, url, true, headers, Some(body)).await
    }

    async fn patch(
        &self,
        url: &str,
        headers: Headers,
        body: String,
    ) -> Result<HttpResponse, CacheError> {
        self.send(Method::PATCH, url, true, headers, Some(body)).await
    }

    async fn delete(&self, url: &str, headers: Headers) -> Result<HttpResponse, CacheError> {
        self.send(Method::DELETE, url, true, headers, None).await
    }

    async fn get_arm(
        &self,
        resource_id: &str,
        api_version: Option<&str>,
        force: bool,
    ) -> Result<HttpResponse, CacheError> {
        self.send_arm(Method::GET, resource_id, api_version, force, None).await
    }

    /// POST without a body, used by the `.../list` endpoints
    async fn post_arm(&self, resource_id: &str, force: bool) -> Result<HttpResponse, CacheError> {
        self.send_arm(Method::POST, resource_id, None, force, None).await
    }

    async fn put_arm(
        &self,
        resource_id: &str,
        api_version: Option<&str>,
        body: String,
    ) -> Result<HttpResponse, CacheError> {
        self.send_arm(Method::PUT, resource_id, api_version, true, Some(body)).await
    }
}

fn with_additional(mut headers: Headers, additional: &[(&str, &str)]) -> Headers {
    for (name, value) in additional {
        headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        headers.push((name.to_string(), value.to_string()));
    }
    headers
}

/// `Authorization: Bearer <token>` plus extra headers
pub fn bearer_headers(token: &str, additional: &[(&str, &str)]) -> Headers {
    with_additional(
        vec![("Authorization".to_string(), format!("Bearer {}", token))],
        additional,
    )
}

/// Headers for calls to the portal service host
pub fn portal_headers(token: &str, additional: &[(&str, &str)]) -> Headers {
    with_additional(
        vec![
            ("portal-token".to_string(), token.to_string()),
            ("client-token".to_string(), token.to_string()),
        ],
        additional,
    )
}

/// Headers for calls served by the function runtime host
pub fn functions_key_headers(master_key: Option<&str>, content_type: Option<&str>) -> Headers {
    let mut headers = vec![("Accept".to_string(), "application/json,*/*".to_string())];
    if let Some(content_type) = content_type {
        headers.push(("Content-Type".to_string(), content_type.to_string()));
    }
    if let Some(key) = master_key {
        headers.push(("x-functions-key".to_string(), key.to_string()));
    }
    headers
}
