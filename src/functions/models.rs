//! Payloads of the SCM, runtime-host and management APIs

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Management-plane resource envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmObj<T> {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub properties: T,
}

/// `config/appsettings/list` response
pub type AppSettings = ArmObj<BTreeMap<String, String>>;

impl ArmObj<BTreeMap<String, String>> {
    pub fn setting(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|s| s.as_str())
    }
}

/// Accepts `true`, `"true"` (any case) and treats everything else as false
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Reads `null` as the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingInfo {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub binding_type: String,
    #[serde(default)]
    pub direction: String,
    #[serde(rename = "webHookType", default, skip_serializing_if = "Option::is_none")]
    pub web_hook_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `function.json` contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfig {
    #[serde(default)]
    pub bindings: Vec<BindingInfo>,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub disabled: bool,
    /// Set by tooling that generated the function (e.g. Visual Studio)
    #[serde(rename = "generatedBy", default, skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FunctionConfig {
    pub fn http_trigger(&self) -> Option<&BindingInfo> {
        self.bindings
            .iter()
            .find(|b| b.binding_type.eq_ignore_ascii_case("httpTrigger"))
    }
}

/// One function as listed by the SCM site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub script_root_path_href: String,
    #[serde(default)]
    pub script_href: String,
    #[serde(default)]
    pub config_href: String,
    #[serde(default)]
    pub secrets_file_href: String,
    #[serde(default)]
    pub config: FunctionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_data: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionKey {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionKeys {
    #[serde(default, deserialize_with = "null_as_default")]
    pub keys: Vec<FunctionKey>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Value>,
}

impl FunctionKeys {
    pub fn find(&self, name: &str) -> Option<&FunctionKey> {
        self.keys.iter().find(|k| k.name == name)
    }
}

/// Entry of the SCM virtual file system
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VfsObject {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub mtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default)]
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl VfsObject {
    pub fn modified(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.mtime).ok()
    }
}

/// A file addressed either by its listing entry or by a raw href
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileRef {
    Vfs(VfsObject),
    Href(String),
}

impl FileRef {
    pub fn href(&self) -> &str {
        match self {
            FileRef::Vfs(file) => &file.href,
            FileRef::Href(href) => href,
        }
    }
}

impl From<VfsObject> for FileRef {
    fn from(file: VfsObject) -> Self {
        FileRef::Vfs(file)
    }
}

impl From<&str> for FileRef {
    fn from(href: &str) -> Self {
        FileRef::Href(href.to_string())
    }
}

impl From<String> for FileRef {
    fn from(href: String) -> Self {
        FileRef::Href(href)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValuePair {
    pub name: String,
    pub value: String,
}

impl NameValuePair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Request built by the test-run panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRunModel {
    pub method: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub query_string_params: Vec<NameValuePair>,
    #[serde(default)]
    pub headers: Vec<NameValuePair>,
    /// Function key sent as the first query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<NameValuePair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionResult {
    pub status_code: u16,
    pub status_text: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(rename = "easyAuthEnabled")]
    pub easy_auth_enabled: bool,
    #[serde(rename = "AADConfigured")]
    pub aad_configured: bool,
    #[serde(rename = "AADNotConfigured")]
    pub aad_not_configured: bool,
    #[serde(rename = "clientCertEnabled")]
    pub client_cert_enabled: bool,
}

/// `admin/host/status` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Major runtime generation of a function app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionGeneration {
    V1,
    V2,
}

impl FunctionGeneration {
    /// Generation selected by `FUNCTIONS_EXTENSION_VERSION`; unset means V1
    pub fn from_extension_version(version: Option<&str>) -> Self {
        match version.map(str::trim) {
            Some(v)
                if v.eq_ignore_ascii_case("beta") || v.starts_with("~2") || v.starts_with('2') =>
            {
                FunctionGeneration::V2
            }
            _ => FunctionGeneration::V1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCondition {
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// One entry of `proxies.json`
/// Binding extension package installed into the runtime host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeExtension {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProxy {
    #[serde(skip_deserializing)]
    pub name: String,
    #[serde(default)]
    pub match_condition: MatchCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_overrides: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_overrides: Option<Value>,
}

impl ApiProxy {
    /// Parse a `proxies.json` document
    ///
    /// Entries that do not have the proxy shape are skipped; a document
    /// without a `proxies` object yields no proxies.
    pub fn list_from_json(document: &Value) -> Vec<ApiProxy> {
        let Some(proxies) = document.get("proxies").and_then(|v| v.as_object()) else {
            return Vec::new();
        };

        proxies
            .iter()
            .filter_map(|(name, value)| match serde_json::from_value::<ApiProxy>(value.clone()) {
                Ok(mut proxy) => {
                    proxy.name = name.clone();
                    Some(proxy)
                }
                Err(e) => {
                    tracing::debug!("skipping proxy {}: {}", name, e);
                    None
                }
            })
            .collect()
    }
}
