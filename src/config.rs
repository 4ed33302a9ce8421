//! Configuration Management
//!
//! Handles persistent configuration storage for tfunc.

use crate::cache::store::{DEFAULT_API_VERSION, DEFAULT_CACHE_TTL};
use crate::functions::service::DEFAULT_SERVICE_HOST;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default management-plane endpoint
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Environment variable overriding the management-plane endpoint
pub const ARM_ENDPOINT_ENV_VAR: &str = "TFUNC_ARM_ENDPOINT";

/// Environment variable overriding the portal service host
pub const SERVICE_HOST_ENV_VAR: &str = "TFUNC_SERVICE_HOST";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Management-plane endpoint
    #[serde(default)]
    pub arm_endpoint: Option<String>,
    /// Portal service host serving templates and binding config
    #[serde(default)]
    pub service_host: Option<String>,
    #[serde(default)]
    pub website_api_version: Option<String>,
    /// How long cached reads stay fresh
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    /// Last used site resource id
    #[serde(default)]
    pub last_site_id: Option<String>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tfunc").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file {:?}", path))?;

        Ok(())
    }

    /// Get effective management endpoint (config > environment > default)
    pub fn effective_arm_endpoint(&self) -> String {
        self.arm_endpoint
            .clone()
            .or_else(|| std::env::var(ARM_ENDPOINT_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_string())
    }

    /// Get effective portal service host, always with a trailing slash
    pub fn effective_service_host(&self) -> String {
        let host = self
            .service_host
            .clone()
            .or_else(|| std::env::var(SERVICE_HOST_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_SERVICE_HOST.to_string());

        if host.ends_with('/') {
            host
        } else {
            format!("{}/", host)
        }
    }

    pub fn effective_website_api_version(&self) -> String {
        self.website_api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string())
    }

    pub fn effective_cache_ttl(&self) -> Duration {
        self.cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL)
    }

    /// Set last used site and save
    pub fn set_last_site(&mut self, site_id: &str) -> Result<()> {
        self.last_site_id = Some(site_id.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config {
            arm_endpoint: Some("https://arm.local".into()),
            ..Default::default()
        };
        assert_eq!(config.effective_arm_endpoint(), "https://arm.local");
        assert_eq!(config.effective_website_api_version(), DEFAULT_API_VERSION);
        assert_eq!(config.effective_cache_ttl(), DEFAULT_CACHE_TTL);
    }

    #[test]
    fn test_service_host_gets_trailing_slash() {
        let config = Config {
            service_host: Some("https://portal.local".into()),
            ..Default::default()
        };
        assert_eq!(config.effective_service_host(), "https://portal.local/");
    }

    #[test]
    fn test_missing_fields_deserialize() {
        let config: Config =
            serde_json::from_str(r#"{"last_site_id": "/subscriptions/s"}"#).unwrap();
        assert_eq!(config.last_site_id.as_deref(), Some("/subscriptions/s"));
        assert!(config.cache_ttl_secs.is_none());
    }
}
