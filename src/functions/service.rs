//! Function app service
//!
//! Domain operations of the console. Each one picks a conditional client
//! flavor, builds its query over the resource cache and returns an
//! [`HttpResult`].

use super::edit_mode::{resolve_edit_mode, EditModeFacts, EditModeSetting, FunctionAppEditMode};
use super::models::{
    ApiProxy, AppSettings, ArmObj, AuthSettings, FileRef, FunctionGeneration, FunctionInfo,
    FunctionKey, FunctionKeys, HostStatus, HttpRunModel, RunFunctionResult, RuntimeExtension,
    VfsObject,
};
use super::resources::{localize, DefaultText, TextLookup};
use super::run::{self, RunFailureContext};
use super::{
    disabled_setting_name, EDIT_MODE_SETTING, EVENT_GRID_KEY_NAME, INSTRUMENTATION_KEY_SETTING,
    MASTER_KEY_NAME, MASTER_KEY_PLACEHOLDER, RUNTIME_VERSION_SETTING,
};
use crate::arm::{Credentials, SiteContext};
use crate::cache::store::DEFAULT_API_VERSION;
use crate::cache::{
    bearer_headers, functions_key_headers, portal_headers, retry_transient, CacheError, Headers,
    HttpResponse, ResourceCache, RetryPolicy,
};
use crate::conditional::{ConditionalClient, HttpResult, PreconditionId, Query};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Preconditions of calls served by the function runtime
pub const RUNTIME_CONDITIONS: [PreconditionId; 4] = [
    PreconditionId::NoClientCertificate,
    PreconditionId::NotOverQuota,
    PreconditionId::NotStopped,
    PreconditionId::ReachableLoadBalancer,
];

/// Preconditions of calls served by the SCM site and the management plane
pub const AZURE_CONDITIONS: [PreconditionId; 2] = [
    PreconditionId::NotOverQuota,
    PreconditionId::ReachableLoadBalancer,
];

/// Default portal service host
pub const DEFAULT_SERVICE_HOST: &str = "https://functions.azure.com/";

/// API version of the Application Insights components listing
pub const APP_INSIGHTS_API_VERSION: &str = "2015-05-01";

/// Endpoints and policies the service does not derive from the site
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    /// Portal service host, with trailing slash
    pub service_host: String,
    pub website_api_version: String,
    pub app_insights_api_version: String,
    /// Retry policy of the legacy designer-schema endpoint
    pub retry: RetryPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            service_host: DEFAULT_SERVICE_HOST.to_string(),
            website_api_version: DEFAULT_API_VERSION.to_string(),
            app_insights_api_version: APP_INSIGHTS_API_VERSION.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Orchestrates every function app operation
pub struct FunctionAppService {
    cache: Arc<dyn ResourceCache>,
    runtime: ConditionalClient,
    azure: ConditionalClient,
    text: Arc<dyn TextLookup>,
    settings: ServiceSettings,
}

fn to_body<T: Serialize>(value: &T) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|e| CacheError::Request(e.to_string()))
}

fn json_headers(token: &str, additional: &[(&str, &str)]) -> Headers {
    let mut headers = bearer_headers(token, &[("Content-Type", "application/json")]);
    for (name, value) in additional {
        headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        headers.push((name.to_string(), value.to_string()));
    }
    headers
}

/// Bearer token plus the host master key when the session has one
fn host_headers(context: &SiteContext, token: &str) -> Headers {
    let mut headers = bearer_headers(token, &[]);
    headers.extend(functions_key_headers(context.master_key(), None));
    headers
}

impl FunctionAppService {
    pub fn new(cache: Arc<dyn ResourceCache>, credentials: Credentials) -> Self {
        let runtime =
            ConditionalClient::new(cache.clone(), credentials.clone(), &RUNTIME_CONDITIONS);
        let azure = ConditionalClient::new(cache.clone(), credentials, &AZURE_CONDITIONS);
        Self::from_clients(cache, runtime, azure)
    }

    /// Build the service around existing client flavors
    pub fn from_clients(
        cache: Arc<dyn ResourceCache>,
        runtime: ConditionalClient,
        azure: ConditionalClient,
    ) -> Self {
        Self {
            cache,
            runtime,
            azure,
            text: Arc::new(DefaultText),
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_text(mut self, text: Arc<dyn TextLookup>) -> Self {
        self.text = text;
        self
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn runtime_client(&self) -> &ConditionalClient {
        &self.runtime
    }

    pub fn azure_client(&self) -> &ConditionalClient {
        &self.azure
    }

    /// Linux sites go through the runtime flavor, everything else through azure
    pub fn client_for(&self, context: &SiteContext) -> &ConditionalClient {
        if context.site.is_linux() {
            &self.runtime
        } else {
            &self.azure
        }
    }

    async fn app_settings(
        &self,
        context: &SiteContext,
        force: bool,
    ) -> Result<AppSettings, CacheError> {
        let resource_id = format!("{}/config/appsettings/list", context.site.id);
        self.cache.post_arm(&resource_id, force).await?.json()
    }

    async fn extension_version(&self, context: &SiteContext) -> Result<Option<String>, CacheError> {
        let settings = self.app_settings(context, false).await?;
        Ok(settings.setting(RUNTIME_VERSION_SETTING).map(str::to_string))
    }

    async fn put_app_settings(&self, settings: &AppSettings) -> Result<HttpResponse, CacheError> {
        self.cache
            .put_arm(
                &settings.id,
                Some(&self.settings.website_api_version),
                to_body(settings)?,
            )
            .await
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// List functions; on V2 `config.disabled` comes from the app settings
    pub async fn get_functions(&self, context: &SiteContext) -> HttpResult<Vec<FunctionInfo>> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.functions_url();
            let (functions, settings) = futures::try_join!(
                self.cache.get(&url, false, bearer_headers(&token, &[])),
                self.app_settings(context, false),
            )?;

            let mut functions: Vec<FunctionInfo> = functions.json()?;
            let version = settings.setting(RUNTIME_VERSION_SETTING);
            let generation = FunctionGeneration::from_extension_version(version);
            if generation == FunctionGeneration::V2 {
                for function in &mut functions {
                    function.config.disabled = settings
                        .setting(&disabled_setting_name(&function.name))
                        .map(|v| v.eq_ignore_ascii_case("true"))
                        .unwrap_or(false);
                }
            }
            Ok(functions)
        });

        self.client_for(context).execute(context, query).await
    }

    pub async fn create_function(
        &self,
        context: &SiteContext,
        function_name: &str,
        template_id: Option<&str>,
    ) -> HttpResult<FunctionInfo> {
        let body = match template_id {
            Some(id) => {
                let template_id = (id != "Empty").then_some(id);
                json!({ "name": function_name, "templateId": template_id })
            }
            None => json!({ "config": {} }),
        };

        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.function_url(function_name);
            let response = self
                .cache
                .put(&url, json_headers(&token, &[]), body.to_string())
                .await?;
            response.json()
        });

        self.client_for(context).execute(context, query).await
    }

    /// Create a function from its files; `sample.dat` becomes the test data
    pub async fn create_function_v2(
        &self,
        context: &SiteContext,
        function_name: &str,
        mut files: Map<String, Value>,
        config: Value,
    ) -> HttpResult<FunctionInfo> {
        let test_data = files.remove("sample.dat");
        let body = json!({ "files": files, "test_data": test_data, "config": config });

        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.function_url(function_name);
            let response = self
                .cache
                .put(&url, json_headers(&token, &[]), body.to_string())
                .await?;
            response.json()
        });

        self.client_for(context)
            .execute_with_conditions(&[], context, query)
            .await
    }

    /// Settings the SCM site reports for the function container
    pub async fn get_function_container_app_settings(
        &self,
        context: &SiteContext,
    ) -> HttpResult<BTreeMap<String, Value>> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.scm_settings_url();
            self.cache
                .get(&url, false, bearer_headers(&token, &[]))
                .await?
                .json()
        });

        self.client_for(context)
            .execute_with_conditions(&[], context, query)
            .await
    }

    /// Replace a function's `function.json`
    pub async fn save_function(
        &self,
        context: &SiteContext,
        function: &FunctionInfo,
        config: Value,
    ) -> HttpResult<FunctionInfo> {
        let body = json!({ "config": config });
        let query = Query::authenticated(|token| async move {
            let response = self
                .cache
                .put(&function.href, json_headers(&token, &[]), body.to_string())
                .await?;
            response.json()
        });

        self.client_for(context).execute(context, query).await
    }

    pub async fn update_function(
        &self,
        context: &SiteContext,
        function: &FunctionInfo,
    ) -> HttpResult<FunctionInfo> {
        let query = Query::authenticated(|token| async move {
            let response = self
                .cache
                .put(&function.href, json_headers(&token, &[]), to_body(function)?)
                .await?;
            response.json()
        });

        self.client_for(context).execute(context, query).await
    }

    /// Delete a function; on V2 its disabled app setting goes too
    pub async fn delete_function(
        &self,
        context: &SiteContext,
        function: &FunctionInfo,
    ) -> HttpResult<()> {
        let query = Query::authenticated(|token| async move {
            self.cache
                .delete(&function.href, bearer_headers(&token, &[]))
                .await?;

            let mut settings = self.app_settings(context, true).await?;
            let version = settings.setting(RUNTIME_VERSION_SETTING);
            let generation = FunctionGeneration::from_extension_version(version);
            if generation == FunctionGeneration::V2
                && settings
                    .properties
                    .remove(&disabled_setting_name(&function.name))
                    .is_some()
            {
                tracing::debug!("removing disabled setting of {}", function.name);
                self.put_app_settings(&settings).await?;
            }
            Ok(())
        });

        self.client_for(context).execute(context, query).await
    }

    // =========================================================================
    // Proxies
    // =========================================================================

    pub async fn get_api_proxies(&self, context: &SiteContext) -> HttpResult<Vec<ApiProxy>> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.proxies_json_url();
            let document: Value = self
                .cache
                .get(&url, false, bearer_headers(&token, &[]))
                .await?
                .json()?;
            Ok(ApiProxy::list_from_json(&document))
        });

        self.client_for(context).execute(context, query).await
    }

    pub async fn save_api_proxy(&self, context: &SiteContext, document: String) -> HttpResult<()> {
        let url = context.url_templates.proxies_json_url();
        self.cache.clear_cache_prefix(&url).await;

        let query = Query::authenticated(|token| async move {
            self.cache
                .put(&url, bearer_headers(&token, &[("If-Match", "*")]), document)
                .await?;
            Ok(())
        });

        self.client_for(context).execute(context, query).await
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub async fn get_file_content(
        &self,
        context: &SiteContext,
        file: &FileRef,
    ) -> HttpResult<String> {
        let query = Query::authenticated(|token| async move {
            let response = self
                .cache
                .get(file.href(), false, bearer_headers(&token, &[]))
                .await?;
            Ok(response.body)
        });

        self.client_for(context).execute(context, query).await
    }

    /// Write a file; cached reads under its href are dropped
    pub async fn save_file(
        &self,
        context: &SiteContext,
        file: FileRef,
        content: String,
    ) -> HttpResult<FileRef> {
        let query = Query::authenticated(|token| async move {
            let headers =
                bearer_headers(&token, &[("Content-Type", "text/plain"), ("If-Match", "*")]);
            self.cache.put(file.href(), headers, content).await?;
            Ok(file)
        });

        self.client_for(context).execute(context, query).await
    }

    pub async fn delete_file(&self, context: &SiteContext, file: FileRef) -> HttpResult<FileRef> {
        let query = Query::authenticated(|token| async move {
            let headers =
                bearer_headers(&token, &[("Content-Type", "text/plain"), ("If-Match", "*")]);
            self.cache.delete(file.href(), headers).await?;
            Ok(file)
        });

        self.client_for(context).execute(context, query).await
    }

    /// List a VFS directory, e.g. a function's `script_root_path_href`
    pub async fn get_vfs_objects(
        &self,
        context: &SiteContext,
        href: &str,
    ) -> HttpResult<Vec<VfsObject>> {
        let query = Query::authenticated(|token| async move {
            self.cache
                .get(href, false, bearer_headers(&token, &[]))
                .await?
                .json()
        });

        self.client_for(context).execute(context, query).await
    }

    /// Tail of the newest log file of a function, first (partial) line dropped
    pub async fn get_old_logs(
        &self,
        context: &SiteContext,
        function_name: &str,
        range: u64,
    ) -> HttpResult<String> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.function_log_url(function_name);
            let files: Vec<VfsObject> = self
                .cache
                .get(&url, false, bearer_headers(&token, &[]))
                .await?
                .json()?;

            let Some(newest) = files.iter().max_by_key(|f| f.modified()) else {
                return Ok(String::new());
            };

            let range_header = format!("bytes=-{}", range);
            let content = self
                .cache
                .get(
                    &newest.href,
                    false,
                    bearer_headers(&token, &[("Range", range_header.as_str())]),
                )
                .await?
                .body;

            Ok(match content.split_once('\n') {
                Some((_, rest)) => rest.to_string(),
                None => content,
            })
        });

        self.client_for(context).execute(context, query).await
    }

    // =========================================================================
    // Host
    // =========================================================================

    pub async fn get_host_json(&self, context: &SiteContext) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.host_json_url();
            self.cache
                .get(&url, false, bearer_headers(&token, &[]))
                .await?
                .json()
        });

        self.client_for(context).execute(context, query).await
    }

    pub async fn save_host_json(
        &self,
        context: &SiteContext,
        document: String,
    ) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.host_json_url();
            self.cache
                .put(&url, json_headers(&token, &[("If-Match", "*")]), document)
                .await?
                .json()
        });

        self.client_for(context).execute(context, query).await
    }

    /// Token for calling the runtime host admin API
    pub async fn get_host_token(&self, context: &SiteContext) -> HttpResult<String> {
        if context.site.is_linux() {
            let query = Query::authenticated(|token| async move {
                let url =
                    format!("{}api/runtimetoken{}", self.settings.service_host, context.site.id);
                let response = self.cache.get(&url, false, portal_headers(&token, &[])).await?;
                Ok(token_body(&response))
            });
            return self.azure.execute_with_conditions(&[], context, query).await;
        }

        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.scm_token_url();
            let response = self.cache.get(&url, false, bearer_headers(&token, &[])).await?;
            Ok(token_body(&response))
        });
        self.azure.execute(context, query).await
    }

    pub async fn get_host_status(&self, context: &SiteContext) -> HttpResult<HostStatus> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.runtime_status_url();
            self.cache
                .get(&url, true, host_headers(context, &token))
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    pub async fn get_host_errors(&self, context: &SiteContext) -> HttpResult<Vec<String>> {
        self.get_host_status(context).await.map(|status| status.errors)
    }

    pub async fn get_function_errors(
        &self,
        context: &SiteContext,
        function_name: &str,
    ) -> HttpResult<Vec<String>> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.function_runtime_errors_url(function_name);
            let status: Value = self
                .cache
                .get(&url, false, host_headers(context, &token))
                .await?
                .json()?;
            Ok(errors_of(&status))
        });

        self.runtime.execute(context, query).await
    }

    pub async fn fire_sync_trigger(&self, context: &SiteContext) -> HttpResult<()> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.sync_triggers_url();
            self.cache
                .post(&url, true, bearer_headers(&token, &[]), None)
                .await?;
            Ok(())
        });

        let result = self
            .client_for(context)
            .execute_with_conditions(&[], context, query)
            .await;
        if let Some(error) = result.error() {
            tracing::warn!("Sync triggers failed for {}: {}", context.site.name, error);
        }
        result
    }

    /// True when the SCM site answers at all
    pub async fn ping_scm_site(&self, context: &SiteContext) -> HttpResult<bool> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.ping_scm_site_url();
            Ok(self
                .cache
                .get(&url, true, bearer_headers(&token, &[]))
                .await
                .is_ok())
        });

        self.azure.execute(context, query).await
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Host keys, always led by the `_master` placeholder entry
    pub async fn get_host_keys(&self, context: &SiteContext) -> HttpResult<FunctionKeys> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.admin_keys_url();
            let mut keys: FunctionKeys = self
                .cache
                .get(&url, false, host_headers(context, &token))
                .await?
                .json::<Option<FunctionKeys>>()?
                .unwrap_or_default();

            keys.keys.insert(
                0,
                FunctionKey {
                    name: MASTER_KEY_NAME.to_string(),
                    value: MASTER_KEY_PLACEHOLDER.to_string(),
                    links: Vec::new(),
                },
            );
            Ok(keys)
        });

        self.runtime.execute(context, query).await
    }

    pub async fn get_function_keys(
        &self,
        context: &SiteContext,
        function_name: &str,
    ) -> HttpResult<FunctionKeys> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.function_keys_url(function_name);
            self.cache
                .get(&url, false, host_headers(context, &token))
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    fn key_url(context: &SiteContext, key_name: &str, function_name: Option<&str>) -> String {
        match function_name {
            Some(function) => context.url_templates.function_key_url(function, key_name),
            None => context.url_templates.admin_key_url(key_name),
        }
    }

    /// Create a function key, or a host key when `function_name` is `None`;
    /// without a value the host generates one
    pub async fn create_key(
        &self,
        context: &SiteContext,
        key_name: &str,
        key_value: Option<&str>,
        function_name: Option<&str>,
    ) -> HttpResult<FunctionKey> {
        let url = Self::key_url(context, key_name, function_name);
        let body = match key_value {
            Some(value) => json!({ "name": key_name, "value": value }).to_string(),
            None => String::new(),
        };

        let query = Query::authenticated(|token| async move {
            let mut headers = host_headers(context, &token);
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
            self.cache.put(&url, headers, body).await?.json()
        });

        self.runtime.execute(context, query).await
    }

    pub async fn delete_key(
        &self,
        context: &SiteContext,
        key_name: &str,
        function_name: Option<&str>,
    ) -> HttpResult<()> {
        let url = Self::key_url(context, key_name, function_name);
        let query = Query::authenticated(|token| async move {
            self.cache.delete(&url, host_headers(context, &token)).await?;
            Ok(())
        });

        self.runtime.execute(context, query).await
    }

    /// Regenerate the value of an existing key
    pub async fn renew_key(
        &self,
        context: &SiteContext,
        key_name: &str,
        function_name: Option<&str>,
    ) -> HttpResult<FunctionKey> {
        let url = Self::key_url(context, key_name, function_name);
        let query = Query::authenticated(|token| async move {
            self.cache
                .post(&url, true, host_headers(context, &token), None)
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    pub async fn create_system_key(
        &self,
        context: &SiteContext,
        key_name: &str,
    ) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.system_key_url(key_name);
            let mut headers = host_headers(context, &token);
            headers.push(("If-Match".to_string(), "*".to_string()));
            self.cache.post(&url, true, headers, None).await?.json()
        });

        self.runtime.execute(context, query).await
    }

    /// System keys of the host; a host answering with an error has none
    pub async fn get_system_keys(&self, context: &SiteContext) -> HttpResult<FunctionKeys> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.system_keys_url();
            match self.cache.get(&url, false, host_headers(context, &token)).await {
                Ok(response) => Ok(response.json::<Option<FunctionKeys>>()?.unwrap_or_default()),
                Err(CacheError::Status { status, .. }) => {
                    tracing::debug!("no system keys for {} ({})", context.site.name, status);
                    Ok(FunctionKeys::default())
                }
                Err(e) => Err(e),
            }
        });

        self.runtime.execute(context, query).await
    }

    /// Value of the EventGrid extension's system key, empty when absent
    pub async fn get_event_grid_key(&self, context: &SiteContext) -> HttpResult<String> {
        self.get_system_keys(context).await.map(|keys| {
            keys.find(EVENT_GRID_KEY_NAME)
                .map(|key| key.value.clone())
                .unwrap_or_default()
        })
    }

    // =========================================================================
    // Runtime extensions
    // =========================================================================

    pub async fn get_host_extensions(&self, context: &SiteContext) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.runtime_extensions_url();
            self.cache
                .get(&url, false, host_headers(context, &token))
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    /// Start installing an extension; the answer describes the install job
    pub async fn install_extension(
        &self,
        context: &SiteContext,
        extension: &RuntimeExtension,
    ) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.runtime_extensions_url();
            let mut headers = host_headers(context, &token);
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
            self.cache
                .post(&url, true, headers, Some(to_body(extension)?))
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    pub async fn get_extension_install_status(
        &self,
        context: &SiteContext,
        job_id: &str,
    ) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.extension_job_status_url(job_id);
            self.cache
                .get(&url, true, host_headers(context, &token))
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    // =========================================================================
    // Site configuration
    // =========================================================================

    /// `config/web` scmType is unset or anything but `None`
    pub async fn is_source_control_enabled(&self, context: &SiteContext) -> HttpResult<bool> {
        let resource_id = format!("{}/config/web", context.site.id);
        let query = Query::ready(async move {
            let config: Value = self.cache.get_arm(&resource_id, None, false).await?.json()?;
            let scm_type = config
                .get("properties")
                .and_then(|p| p.get("scmType"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(scm_type.is_empty() || scm_type != "None")
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    /// Deployment slots of the site; a slot has none of its own
    pub async fn get_slots_list(&self, context: &SiteContext) -> HttpResult<Vec<ArmObj<Value>>> {
        if context.site.is_slot() {
            return HttpResult::success(Vec::new());
        }

        let resource_id = format!("{}/slots", context.site.id);
        let query = Query::ready(async move {
            let list: Value = self.cache.get_arm(&resource_id, None, false).await?.json()?;
            let slots = list.get("value").cloned().unwrap_or_else(|| json!([]));
            serde_json::from_value(slots).map_err(|e| CacheError::Parse {
                url: resource_id.clone(),
                message: e.to_string(),
            })
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    /// Resolve the edit mode from source control, the edit-mode setting,
    /// slots and generated functions
    ///
    /// Each input that cannot be read falls back to its unknown value.
    pub async fn get_function_app_edit_mode(
        &self,
        context: &SiteContext,
    ) -> HttpResult<FunctionAppEditMode> {
        let query = Query::ready(async move {
            let settings = async {
                let query = Query::ready(self.app_settings(context, true));
                self.azure.execute_with_conditions(&[], context, query).await
            };
            let has_slots = async {
                if context.site.is_slot() {
                    HttpResult::success(true)
                } else {
                    self.get_slots_list(context).await.map(|slots| !slots.is_empty())
                }
            };

            let (source_controlled, settings, has_slots, functions) = futures::join!(
                self.is_source_control_enabled(context),
                settings,
                has_slots,
                self.get_functions(context),
            );

            let facts = EditModeFacts {
                source_controlled: source_controlled.ok().unwrap_or(false),
                setting: EditModeSetting::parse(
                    settings.result().and_then(|s| s.setting(EDIT_MODE_SETTING)),
                ),
                has_slots: has_slots.ok().unwrap_or(false),
                vs_generated: functions
                    .result()
                    .map(|functions| {
                        functions.iter().any(|f| {
                            f.config
                                .generated_by
                                .as_deref()
                                .is_some_and(|g| !g.is_empty())
                        })
                    })
                    .unwrap_or(false),
            };
            tracing::debug!("edit mode inputs for {}: {:?}", context.site.name, facts);

            Ok(resolve_edit_mode(&facts))
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    pub async fn get_auth_settings(&self, context: &SiteContext) -> HttpResult<AuthSettings> {
        let resource_id = format!("{}/config/authsettings/list", context.site.id);
        let query = Query::ready(async move {
            let auth: Value = self.cache.post_arm(&resource_id, false).await?.json()?;
            let properties = auth.get("properties").unwrap_or(&Value::Null);
            let aad_configured = properties
                .get("clientId")
                .and_then(|v| v.as_str())
                .is_some_and(|id| !id.is_empty());

            Ok(AuthSettings {
                easy_auth_enabled: crate::arm::site::easy_auth_enabled(properties),
                aad_configured,
                aad_not_configured: !aad_configured,
                client_cert_enabled: context.site.client_cert_enabled,
            })
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    /// Merge `settings` into the site's auth settings and write them back
    ///
    /// An empty map is a no-op.
    pub async fn create_auth_settings(
        &self,
        context: &SiteContext,
        settings: Map<String, Value>,
    ) -> HttpResult<()> {
        if settings.is_empty() {
            return HttpResult::success(());
        }

        let resource_id = format!("{}/config/authsettings/list", context.site.id);
        let query = Query::ready(async move {
            let mut auth: ArmObj<Map<String, Value>> =
                self.cache.post_arm(&resource_id, true).await?.json()?;
            auth.properties.extend(settings);
            self.cache
                .put_arm(&auth.id, Some(&self.settings.website_api_version), to_body(&auth)?)
                .await?;
            Ok(())
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    pub async fn get_extension_version(&self, context: &SiteContext) -> HttpResult<Option<String>> {
        let query = Query::ready(self.extension_version(context));
        self.azure.execute_with_conditions(&[], context, query).await
    }

    pub async fn get_runtime_generation(
        &self,
        context: &SiteContext,
    ) -> HttpResult<FunctionGeneration> {
        self.get_extension_version(context)
            .await
            .map(|version| FunctionGeneration::from_extension_version(version.as_deref()))
    }

    /// Add an app setting; an existing one is kept unless `replace_if_exists`
    pub async fn create_application_setting(
        &self,
        context: &SiteContext,
        name: &str,
        value: &str,
        replace_if_exists: bool,
    ) -> HttpResult<()> {
        if name.is_empty() || value.is_empty() {
            return HttpResult::failure(
                CacheError::Request("app setting name and value are required".into()).error_id(),
            );
        }

        let query = Query::ready(async move {
            let mut settings = self.app_settings(context, true).await?;
            if !replace_if_exists && settings.properties.contains_key(name) {
                return Ok(());
            }
            settings.properties.insert(name.to_string(), value.to_string());
            self.put_app_settings(&settings).await?;
            Ok(())
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    /// Whether the instrumentation key points at a component of the subscription
    pub async fn is_app_insights_enabled(&self, context: &SiteContext) -> HttpResult<bool> {
        let query = Query::ready(async move {
            let settings = self.app_settings(context, false).await?;
            let Some(key) = settings
                .setting(INSTRUMENTATION_KEY_SETTING)
                .filter(|k| !k.is_empty())
            else {
                return Ok(false);
            };
            let Some(subscription) = context.site.subscription_id() else {
                return Ok(false);
            };

            let resource_id = format!(
                "/subscriptions/{}/providers/microsoft.insights/components",
                subscription
            );
            let components: Value = self
                .cache
                .get_arm(&resource_id, Some(&self.settings.app_insights_api_version), false)
                .await?
                .json()?;

            Ok(components
                .get("value")
                .and_then(|v| v.as_array())
                .map(|components| {
                    components.iter().any(|c| {
                        c.get("properties")
                            .and_then(|p| p.get("InstrumentationKey"))
                            .and_then(|v| v.as_str())
                            .is_some_and(|k| k.eq_ignore_ascii_case(key))
                    })
                })
                .unwrap_or(false))
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    // =========================================================================
    // Templates and schemas
    // =========================================================================

    /// Function templates for the app's runtime version, localized
    pub async fn get_templates(&self, context: &SiteContext) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let runtime = self
                .extension_version(context)
                .await?
                .unwrap_or_else(|| "latest".to_string());
            let url = format!(
                "{}api/templates?runtime={}",
                self.settings.service_host,
                urlencoding::encode(&runtime)
            );
            let mut templates: Value = self
                .cache
                .get(&url, true, portal_headers(&token, &[]))
                .await?
                .json()?;
            localize(&mut templates, self.text.as_ref());
            Ok(templates)
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    pub async fn get_binding_config(&self, context: &SiteContext) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let runtime = self
                .extension_version(context)
                .await?
                .unwrap_or_else(|| "latest".to_string());
            let url = format!(
                "{}api/bindingconfig?runtime={}",
                self.settings.service_host,
                urlencoding::encode(&runtime)
            );
            let mut config: Value = self
                .cache
                .get(&url, false, portal_headers(&token, &[]))
                .await?
                .json()?;
            localize(&mut config, self.text.as_ref());
            Ok(config)
        });

        self.azure.execute(context, query).await
    }

    /// `function.json` schema for the designer, from the legacy endpoint
    ///
    /// The only call that retries: 500 and 502 answers are retried per
    /// [`ServiceSettings::retry`].
    pub async fn get_designer_schema(&self, context: &SiteContext) -> HttpResult<Value> {
        let url = format!("{}mocks/function-json-schema.json", self.settings.service_host);
        let query = Query::ready(async move {
            let response = retry_transient(self.settings.retry, || {
                self.cache.get(&url, false, Vec::new())
            })
            .await?;
            response.json()
        });

        self.azure.execute_with_conditions(&[], context, query).await
    }

    pub async fn get_generated_swagger_data(&self, context: &SiteContext) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.generated_swagger_data_url();
            self.cache
                .get(&url, false, host_headers(context, &token))
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    pub async fn get_swagger_document(&self, context: &SiteContext) -> HttpResult<Value> {
        let query = Query::authenticated(|token| async move {
            let url = context.url_templates.swagger_document_url();
            self.cache
                .get(&url, false, host_headers(context, &token))
                .await?
                .json()
        });

        self.runtime.execute(context, query).await
    }

    // =========================================================================
    // Running functions
    // =========================================================================

    async fn run_failure_context(&self, context: &SiteContext) -> RunFailureContext {
        match self.get_auth_settings(context).await.ok() {
            Some(auth) => RunFailureContext {
                easy_auth_enabled: auth.easy_auth_enabled,
                client_cert_enabled: auth.client_cert_enabled,
            },
            None => RunFailureContext::default(),
        }
    }

    async fn finish_run(
        &self,
        context: &SiteContext,
        function: &FunctionInfo,
        response: Result<HttpResponse, CacheError>,
    ) -> RunFunctionResult {
        match response {
            Ok(response) => run::run_result(&response),
            Err(e) => {
                tracing::debug!("run of {} failed: {}", function.name, e);
                let site = self.run_failure_context(context).await;
                run::translate_run_failure(&e, site, &function.name, self.text.as_ref())
            }
        }
    }

    /// Invoke an HTTP-triggered function through its public route
    ///
    /// Failures of the call itself come back as a successful result carrying
    /// the translated status and text.
    pub async fn run_http_function(
        &self,
        context: &SiteContext,
        function: &FunctionInfo,
        url_template: &str,
        model: &HttpRunModel,
    ) -> HttpResult<RunFunctionResult> {
        let query = Query::ready(async move {
            let method = Method::from_bytes(model.method.to_ascii_uppercase().as_bytes())
                .map_err(|e| {
                    CacheError::Request(format!("invalid method {}: {}", model.method, e))
                })?;
            let url = run::build_run_url(url_template, model);

            let mut headers =
                functions_key_headers(context.master_key(), run::run_content_type(function));
            headers.extend(
                model
                    .headers
                    .iter()
                    .map(|h| (h.name.clone(), h.value.clone())),
            );

            let body = match method {
                Method::GET | Method::HEAD | Method::DELETE => None,
                _ => Some(model.body.clone()),
            };

            // Runs are never served from the cache
            let response = self.cache.send(method, &url, true, headers, body).await;
            Ok(self.finish_run(context, function, response).await)
        });

        self.client_for(context)
            .execute_with_conditions(&[], context, query)
            .await
    }

    /// Invoke any function through the admin API with `{"input": content}`
    pub async fn run_function(
        &self,
        context: &SiteContext,
        function: &FunctionInfo,
        content: &str,
    ) -> HttpResult<RunFunctionResult> {
        let query = Query::ready(async move {
            let url = context
                .url_templates
                .run_function_url(&function.name.to_lowercase());
            let body = json!({ "input": content }).to_string();
            let headers = functions_key_headers(context.master_key(), Some("application/json"));

            let response = self.cache.post(&url, true, headers, Some(body)).await;
            Ok(self.finish_run(context, function, response).await)
        });

        self.client_for(context)
            .execute_with_conditions(&[], context, query)
            .await
    }
}

/// Token endpoints answer with a JSON string; fall back to the raw body
fn token_body(response: &HttpResponse) -> String {
    response
        .json::<String>()
        .unwrap_or_else(|_| response.body.trim().to_string())
}

fn errors_of(status: &Value) -> Vec<String> {
    status
        .get("errors")
        .and_then(|v| v.as_array())
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
