//! Sites
//!
//! The target of every operation: one function app (or slot) as described by
//! the management plane, plus the URLs of its SCM and runtime-host endpoints.

use serde_json::Value;

/// Resource id segment marking a deployment slot
const SLOTS_SEGMENT: &str = "slots";

/// Function app as returned by the management plane
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Site {
    pub id: String,
    pub name: String,
    /// Comma separated kind list, e.g. `functionapp,linux`
    pub kind: String,
    pub state: String,
    pub usage_state: String,
    pub client_cert_enabled: bool,
    pub default_host_name: String,
    pub scm_host_name: String,
}

impl From<&Value> for Site {
    fn from(value: &Value) -> Self {
        let properties = value.get("properties").unwrap_or(&Value::Null);
        let str_prop = |key: &str| {
            properties
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let default_host_name = str_prop("defaultHostName");

        // The SCM host is the "Repository" entry of hostNameSslStates
        let scm_host_name = properties
            .get("hostNameSslStates")
            .and_then(|v| v.as_array())
            .and_then(|states| {
                states.iter().find(|s| {
                    s.get("hostType")
                        .and_then(|v| v.as_str())
                        .map(|t| t.eq_ignore_ascii_case("repository"))
                        .unwrap_or(false)
                })
            })
            .and_then(|s| s.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| derive_scm_host(&default_host_name));

        Self {
            id: value
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            name: value
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            kind: value
                .get("kind")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            state: str_prop("state"),
            usage_state: str_prop("usageState"),
            client_cert_enabled: properties
                .get("clientCertEnabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            default_host_name,
            scm_host_name,
        }
    }
}

/// `app.azurewebsites.net` -> `app.scm.azurewebsites.net`
fn derive_scm_host(default_host_name: &str) -> String {
    match default_host_name.split_once('.') {
        Some((app, rest)) => format!("{}.scm.{}", app, rest),
        None => default_host_name.to_string(),
    }
}

impl Site {
    /// Whether the site runs on the Linux-based plan
    pub fn is_linux(&self) -> bool {
        self.kind
            .split(',')
            .any(|k| k.trim().eq_ignore_ascii_case("linux"))
    }

    /// Slot ids look like
    /// `/subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Web/sites/<site>/slots/<slot>`
    pub fn is_slot(&self) -> bool {
        let segments: Vec<&str> = self.id.split('/').collect();
        segments.len() == 11 && segments[9].eq_ignore_ascii_case(SLOTS_SEGMENT)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        let segments: Vec<&str> = self.id.split('/').collect();
        match segments.as_slice() {
            ["", subscriptions, id, ..] if subscriptions.eq_ignore_ascii_case("subscriptions") => {
                Some(*id)
            }
            _ => None,
        }
    }
}

/// Resolve the easy-auth flag from `config/authsettings/list` properties
///
/// Easy auth counts as enabled unless anonymous requests are let through
/// (`unauthenticatedClientAction` of `1` / `AllowAnonymous`).
pub fn easy_auth_enabled(properties: &Value) -> bool {
    let enabled = properties
        .get("enabled")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let allows_anonymous = match properties.get("unauthenticatedClientAction") {
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        Some(Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("AllowAnonymous"),
        _ => false,
    };

    enabled && !allows_anonymous
}

/// URL builders for the SCM site and the runtime host of one site
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTemplates {
    main_site_url: String,
    scm_url: String,
}

impl UrlTemplates {
    pub fn new(main_site_url: impl Into<String>, scm_url: impl Into<String>) -> Self {
        Self {
            main_site_url: main_site_url.into().trim_end_matches('/').to_string(),
            scm_url: scm_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn for_site(site: &Site) -> Self {
        Self::new(
            format!("https://{}", site.default_host_name),
            format!("https://{}", site.scm_host_name),
        )
    }

    pub fn main_site_url(&self) -> &str {
        &self.main_site_url
    }

    pub fn scm_url(&self) -> &str {
        &self.scm_url
    }

    // =========================================================================
    // SCM site
    // =========================================================================

    pub fn ping_scm_site_url(&self) -> String {
        format!("{}/", self.scm_url)
    }

    pub fn functions_url(&self) -> String {
        format!("{}/api/functions", self.scm_url)
    }

    pub fn function_url(&self, function_name: &str) -> String {
        format!("{}/api/functions/{}", self.scm_url, function_name)
    }

    pub fn host_json_url(&self) -> String {
        format!("{}/api/functions/config", self.scm_url)
    }

    pub fn proxies_json_url(&self) -> String {
        format!("{}/api/vfs/site/wwwroot/proxies.json", self.scm_url)
    }

    pub fn scm_settings_url(&self) -> String {
        format!("{}/api/settings", self.scm_url)
    }

    pub fn scm_token_url(&self) -> String {
        format!("{}/api/functions/admin/token", self.scm_url)
    }

    pub fn sync_triggers_url(&self) -> String {
        format!("{}/api/functions/synctriggers", self.scm_url)
    }

    pub fn function_log_url(&self, function_name: &str) -> String {
        format!(
            "{}/api/vfs/logfiles/application/functions/function/{}/",
            self.scm_url, function_name
        )
    }

    // =========================================================================
    // Runtime host
    // =========================================================================

    pub fn runtime_status_url(&self) -> String {
        format!("{}/admin/host/status", self.main_site_url)
    }

    pub fn admin_keys_url(&self) -> String {
        format!("{}/admin/host/keys", self.main_site_url)
    }

    pub fn admin_key_url(&self, key_name: &str) -> String {
        format!("{}/admin/host/keys/{}", self.main_site_url, key_name)
    }

    pub fn system_keys_url(&self) -> String {
        format!("{}/admin/host/systemkeys", self.main_site_url)
    }

    pub fn system_key_url(&self, key_name: &str) -> String {
        format!("{}/admin/host/systemkeys/{}", self.main_site_url, key_name)
    }

    pub fn runtime_extensions_url(&self) -> String {
        format!("{}/admin/host/extensions", self.main_site_url)
    }

    pub fn extension_job_status_url(&self, job_id: &str) -> String {
        format!("{}/admin/host/extensions/jobs/{}", self.main_site_url, job_id)
    }

    pub fn function_keys_url(&self, function_name: &str) -> String {
        format!("{}/admin/functions/{}/keys", self.main_site_url, function_name)
    }

    pub fn function_key_url(&self, function_name: &str, key_name: &str) -> String {
        format!(
            "{}/admin/functions/{}/keys/{}",
            self.main_site_url, function_name, key_name
        )
    }

    pub fn function_runtime_errors_url(&self, function_name: &str) -> String {
        format!("{}/admin/functions/{}/status", self.main_site_url, function_name)
    }

    pub fn run_function_url(&self, function_name: &str) -> String {
        format!("{}/admin/functions/{}", self.main_site_url, function_name)
    }

    pub fn generated_swagger_data_url(&self) -> String {
        format!("{}/admin/host/swagger/default", self.main_site_url)
    }

    pub fn swagger_document_url(&self) -> String {
        format!("{}/admin/host/swagger", self.main_site_url)
    }
}

/// Target context for one operation
///
/// Carries the site, its URL templates and the session's host master key.
/// The master key is explicit state: callers set it after resolving the host
/// keys instead of it living on a service instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteContext {
    pub site: Site,
    pub url_templates: UrlTemplates,
    master_key: Option<String>,
}

impl SiteContext {
    pub fn new(site: Site) -> Self {
        let url_templates = UrlTemplates::for_site(&site);
        Self::with_url_templates(site, url_templates)
    }

    pub fn with_url_templates(site: Site, url_templates: UrlTemplates) -> Self {
        Self {
            site,
            url_templates,
            master_key: None,
        }
    }

    pub fn with_master_key(mut self, master_key: impl Into<String>) -> Self {
        self.master_key = Some(master_key.into());
        self
    }

    pub fn master_key(&self) -> Option<&str> {
        self.master_key.as_deref()
    }
}
