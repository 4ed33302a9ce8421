//! Preconditions
//!
//! Named gates evaluated against a [`SiteContext`] before a call is made.
//! Every [`PreconditionId`] is bound to exactly one check in a
//! [`PreconditionRegistry`].

use crate::arm::site::easy_auth_enabled;
use crate::arm::SiteContext;
use crate::cache::{functions_key_headers, CacheError, ResourceCache};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Closed set of precondition identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PreconditionId {
    NotStopped,
    ReachableLoadBalancer,
    NotOverQuota,
    NoEasyAuth,
    RuntimeAvailable,
    NoClientCertificate,
}

impl PreconditionId {
    /// Every identifier, in declaration order
    pub const ALL: [PreconditionId; 6] = [
        PreconditionId::NotStopped,
        PreconditionId::ReachableLoadBalancer,
        PreconditionId::NotOverQuota,
        PreconditionId::NoEasyAuth,
        PreconditionId::RuntimeAvailable,
        PreconditionId::NoClientCertificate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PreconditionId::NotStopped => "NotStopped",
            PreconditionId::ReachableLoadBalancer => "ReachableLoadBalancer",
            PreconditionId::NotOverQuota => "NotOverQuota",
            PreconditionId::NoEasyAuth => "NoEasyAuth",
            PreconditionId::RuntimeAvailable => "RuntimeAvailable",
            PreconditionId::NoClientCertificate => "NoClientCertificate",
        }
    }

    /// Error id reported when this check is not met
    pub fn error_id(self) -> &'static str {
        match self {
            PreconditionId::NotStopped => "SiteStopped",
            PreconditionId::ReachableLoadBalancer => "LoadBalancerUnreachable",
            PreconditionId::NotOverQuota => "SiteOverQuota",
            PreconditionId::NoEasyAuth => "EasyAuthEnabled",
            PreconditionId::RuntimeAvailable => "RuntimeUnavailable",
            PreconditionId::NoClientCertificate => "ClientCertificateEnabled",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PreconditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionResult {
    pub condition_met: bool,
    pub error_id: String,
}

impl PreconditionResult {
    pub fn met() -> Self {
        Self {
            condition_met: true,
            error_id: String::new(),
        }
    }

    pub fn unmet(error_id: impl Into<String>) -> Self {
        Self {
            condition_met: false,
            error_id: error_id.into(),
        }
    }

    /// Result for `id`, met when `holds` is true
    pub fn for_check(id: PreconditionId, holds: bool) -> Self {
        if holds {
            Self::met()
        } else {
            Self::unmet(id.error_id())
        }
    }
}

/// A gate that must hold before a call proceeds
///
/// Checks are pure reads: they may query the cache but never mutate shared
/// state. An `Err` means the check itself could not be evaluated, which is
/// reported separately from "condition not met".
#[async_trait]
pub trait Precondition: Send + Sync {
    fn id(&self) -> PreconditionId;

    async fn check(&self, context: &SiteContext) -> Result<PreconditionResult>;
}

/// `properties` of the site as seen by the management plane
async fn site_properties(cache: &dyn ResourceCache, context: &SiteContext) -> Result<Value> {
    let response = cache.get_arm(&context.site.id, None, false).await?;
    let site: Value = response.json()?;
    Ok(site.get("properties").cloned().unwrap_or(Value::Null))
}

fn str_property<'a>(properties: &'a Value, key: &str) -> &'a str {
    properties.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

pub struct NotStoppedCheck {
    cache: Arc<dyn ResourceCache>,
}

impl NotStoppedCheck {
    pub fn new(cache: Arc<dyn ResourceCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Precondition for NotStoppedCheck {
    fn id(&self) -> PreconditionId {
        PreconditionId::NotStopped
    }

    async fn check(&self, context: &SiteContext) -> Result<PreconditionResult> {
        let properties = site_properties(self.cache.as_ref(), context).await?;
        let stopped = str_property(&properties, "state").eq_ignore_ascii_case("stopped");
        Ok(PreconditionResult::for_check(self.id(), !stopped))
    }
}

pub struct NotOverQuotaCheck {
    cache: Arc<dyn ResourceCache>,
}

impl NotOverQuotaCheck {
    pub fn new(cache: Arc<dyn ResourceCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Precondition for NotOverQuotaCheck {
    fn id(&self) -> PreconditionId {
        PreconditionId::NotOverQuota
    }

    async fn check(&self, context: &SiteContext) -> Result<PreconditionResult> {
        let properties = site_properties(self.cache.as_ref(), context).await?;
        let exceeded = str_property(&properties, "usageState").eq_ignore_ascii_case("exceeded");
        Ok(PreconditionResult::for_check(self.id(), !exceeded))
    }
}

pub struct ReachableLoadBalancerCheck {
    cache: Arc<dyn ResourceCache>,
}

impl ReachableLoadBalancerCheck {
    pub fn new(cache: Arc<dyn ResourceCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Precondition for ReachableLoadBalancerCheck {
    fn id(&self) -> PreconditionId {
        PreconditionId::ReachableLoadBalancer
    }

    /// Any HTTP answer from the SCM site means the front end is reachable
    async fn check(&self, context: &SiteContext) -> Result<PreconditionResult> {
        let url = context.url_templates.ping_scm_site_url();
        match self.cache.get(&url, true, Vec::new()).await {
            Ok(_) | Err(CacheError::Status { .. }) => Ok(PreconditionResult::met()),
            Err(CacheError::Network { status: 0, message, .. }) => {
                tracing::debug!("SCM site unreachable at {}: {}", url, message);
                Ok(PreconditionResult::unmet(self.id().error_id()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct NoEasyAuthCheck {
    cache: Arc<dyn ResourceCache>,
}

impl NoEasyAuthCheck {
    pub fn new(cache: Arc<dyn ResourceCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Precondition for NoEasyAuthCheck {
    fn id(&self) -> PreconditionId {
        PreconditionId::NoEasyAuth
    }

    async fn check(&self, context: &SiteContext) -> Result<PreconditionResult> {
        let resource_id = format!("{}/config/authsettings/list", context.site.id);
        let auth: Value = self.cache.post_arm(&resource_id, false).await?.json()?;
        let properties = auth.get("properties").unwrap_or(&Value::Null);
        Ok(PreconditionResult::for_check(
            self.id(),
            !easy_auth_enabled(properties),
        ))
    }
}

pub struct RuntimeAvailableCheck {
    cache: Arc<dyn ResourceCache>,
}

impl RuntimeAvailableCheck {
    pub fn new(cache: Arc<dyn ResourceCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Precondition for RuntimeAvailableCheck {
    fn id(&self) -> PreconditionId {
        PreconditionId::RuntimeAvailable
    }

    async fn check(&self, context: &SiteContext) -> Result<PreconditionResult> {
        let url = context.url_templates.runtime_status_url();
        let headers = functions_key_headers(context.master_key(), None);
        let status: Value = match self.cache.get(&url, true, headers).await {
            Ok(response) => response.json()?,
            // The host answering with an error is a runtime that is not available
            Err(CacheError::Status { .. }) => {
                return Ok(PreconditionResult::unmet(self.id().error_id()));
            }
            Err(e) => return Err(e.into()),
        };
        let running = str_property(&status, "state").eq_ignore_ascii_case("running");
        Ok(PreconditionResult::for_check(self.id(), running))
    }
}

/// Answered from the context alone, no network call
pub struct NoClientCertificateCheck;

#[async_trait]
impl Precondition for NoClientCertificateCheck {
    fn id(&self) -> PreconditionId {
        PreconditionId::NoClientCertificate
    }

    async fn check(&self, context: &SiteContext) -> Result<PreconditionResult> {
        Ok(PreconditionResult::for_check(
            self.id(),
            !context.site.client_cert_enabled,
        ))
    }
}

/// Immutable table binding every [`PreconditionId`] to its check
#[derive(Clone)]
pub struct PreconditionRegistry {
    checks: Arc<[Arc<dyn Precondition>]>,
}

impl PreconditionRegistry {
    /// Registry of the real checks, all reading through `cache`
    pub fn new(cache: Arc<dyn ResourceCache>) -> Self {
        Self::from_fn(|id| -> Arc<dyn Precondition> {
            match id {
                PreconditionId::NotStopped => Arc::new(NotStoppedCheck::new(cache.clone())),
                PreconditionId::ReachableLoadBalancer => {
                    Arc::new(ReachableLoadBalancerCheck::new(cache.clone()))
                }
                PreconditionId::NotOverQuota => Arc::new(NotOverQuotaCheck::new(cache.clone())),
                PreconditionId::NoEasyAuth => Arc::new(NoEasyAuthCheck::new(cache.clone())),
                PreconditionId::RuntimeAvailable => {
                    Arc::new(RuntimeAvailableCheck::new(cache.clone()))
                }
                PreconditionId::NoClientCertificate => Arc::new(NoClientCertificateCheck),
            }
        })
    }

    /// Build a registry from a binding function
    ///
    /// # Panics
    ///
    /// Panics if a check is bound to an identifier other than its own.
    pub fn from_fn(mut bind: impl FnMut(PreconditionId) -> Arc<dyn Precondition>) -> Self {
        let checks: Vec<Arc<dyn Precondition>> = PreconditionId::ALL
            .iter()
            .map(|&id| {
                let check = bind(id);
                assert_eq!(
                    check.id(),
                    id,
                    "precondition {} bound to the check for {}",
                    id,
                    check.id()
                );
                check
            })
            .collect();

        Self {
            checks: checks.into(),
        }
    }

    pub fn get(&self, id: PreconditionId) -> &dyn Precondition {
        self.checks[id.index()].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::Site;

    #[test]
    fn test_all_matches_declaration_order() {
        for (i, id) in PreconditionId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn test_error_ids_are_distinct() {
        let mut ids: Vec<&str> = PreconditionId::ALL.iter().map(|id| id.error_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), PreconditionId::ALL.len());
    }

    #[tokio::test]
    async fn test_client_certificate_check_reads_context() {
        let mut site = Site::default();
        let check = NoClientCertificateCheck;

        let met = check.check(&SiteContext::new(site.clone())).await.unwrap();
        assert!(met.condition_met);

        site.client_cert_enabled = true;
        let unmet = check.check(&SiteContext::new(site)).await.unwrap();
        assert_eq!(unmet, PreconditionResult::unmet("ClientCertificateEnabled"));
    }

    #[test]
    #[should_panic(expected = "bound to the check for")]
    fn test_registry_rejects_misbound_check() {
        PreconditionRegistry::from_fn(|_| Arc::new(NoClientCertificateCheck));
    }
}
