//! Conditional client
//!
//! Runs a query only when every precondition in a list holds, and wraps the
//! outcome in an [`HttpResult`].

use super::preconditions::{PreconditionId, PreconditionRegistry};
use super::result::HttpResult;
use crate::arm::{Credentials, SiteContext};
use crate::cache::{CacheError, ResourceCache};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

pub type AuthToken = String;

pub type QueryFuture<'a, T> = BoxFuture<'a, Result<T, CacheError>>;

/// Error id reported when no access token could be resolved
pub const TOKEN_UNAVAILABLE: &str = "TokenUnavailable";

/// Error id prefix reported when a check could not be evaluated
pub const PRECONDITION_CHECK_FAILED: &str = "PreconditionCheckFailed";

/// The call to make once the gate passes
pub enum Query<'a, T> {
    /// A future that needs nothing further. It is not polled unless the gate passes.
    Ready(QueryFuture<'a, T>),
    /// A call parameterized by the session's access token
    Authenticated(Box<dyn FnOnce(AuthToken) -> QueryFuture<'a, T> + Send + 'a>),
}

impl<'a, T> Query<'a, T> {
    pub fn ready<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, CacheError>> + Send + 'a,
    {
        Query::Ready(future.boxed())
    }

    pub fn authenticated<F, Fut>(query: F) -> Self
    where
        F: FnOnce(AuthToken) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'a,
    {
        Query::Authenticated(Box::new(move |token| query(token).boxed()))
    }
}

/// Gatekeeper for one client flavor
#[derive(Clone)]
pub struct ConditionalClient {
    registry: PreconditionRegistry,
    conditions: Vec<PreconditionId>,
    credentials: Credentials,
}

impl ConditionalClient {
    pub fn new(
        cache: Arc<dyn ResourceCache>,
        credentials: Credentials,
        default_conditions: &[PreconditionId],
    ) -> Self {
        Self::with_registry(PreconditionRegistry::new(cache), credentials, default_conditions)
    }

    pub fn with_registry(
        registry: PreconditionRegistry,
        credentials: Credentials,
        default_conditions: &[PreconditionId],
    ) -> Self {
        Self {
            registry,
            conditions: default_conditions.to_vec(),
            credentials,
        }
    }

    pub fn default_conditions(&self) -> &[PreconditionId] {
        &self.conditions
    }

    /// Run `query` under this client's default preconditions
    pub async fn execute<'a, T>(
        &self,
        context: &SiteContext,
        query: Query<'a, T>,
    ) -> HttpResult<T> {
        self.execute_with_conditions(&self.conditions, context, query).await
    }

    /// Run `query` under an explicit precondition list (empty = unconditional)
    pub async fn execute_with_conditions<'a, T>(
        &self,
        preconditions: &[PreconditionId],
        context: &SiteContext,
        query: Query<'a, T>,
    ) -> HttpResult<T> {
        if let Some(error_id) = self.first_failure(preconditions, context).await {
            tracing::debug!("{} blocked by precondition: {}", context.site.name, error_id);
            return HttpResult::failure(error_id);
        }

        let outcome = match query {
            Query::Ready(future) => future.await,
            Query::Authenticated(query) => match self.credentials.get_token().await {
                Ok(token) => query(token).await,
                Err(e) => {
                    tracing::warn!("No access token for {}: {:#}", context.site.name, e);
                    return HttpResult::failure(TOKEN_UNAVAILABLE);
                }
            },
        };

        match outcome {
            Ok(result) => HttpResult::success(result),
            Err(e) => {
                tracing::debug!("query failed: {}", e);
                HttpResult::failure(e.error_id())
            }
        }
    }

    /// Evaluate all checks concurrently; report the first failure in list order
    async fn first_failure(
        &self,
        preconditions: &[PreconditionId],
        context: &SiteContext,
    ) -> Option<String> {
        let checks = preconditions.iter().map(|&id| async move {
            let result = self.registry.get(id).check(context).await;
            (id, result)
        });

        join_all(checks)
            .await
            .into_iter()
            .find_map(|(id, result)| match result {
                Ok(r) if r.condition_met => None,
                Ok(r) => Some(r.error_id),
                Err(e) => {
                    tracing::warn!("Precondition {} could not be evaluated: {:#}", id, e);
                    Some(format!("{}:{}", PRECONDITION_CHECK_FAILED, id))
                }
            })
    }
}
