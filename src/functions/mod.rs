//! Function app operations
//!
//! Domain layer of the console. Every operation of [`FunctionAppService`]
//! runs through a [`ConditionalClient`](crate::conditional::ConditionalClient)
//! and returns an [`HttpResult`](crate::conditional::HttpResult).
//!
//! # Module Structure
//!
//! - [`models`] - serde payloads of the SCM, runtime-host and management APIs
//! - [`edit_mode`] - edit-mode decision table
//! - [`run`] - run-URL building and run failure translation
//! - [`resources`] - text lookup and template localization
//! - [`service`] - [`FunctionAppService`]

pub mod edit_mode;
pub mod models;
pub mod resources;
pub mod run;
pub mod service;

pub use edit_mode::{resolve_edit_mode, EditModeFacts, EditModeSetting, FunctionAppEditMode};
pub use models::*;
pub use resources::{localize, DefaultText, TextLookup};
pub use service::{FunctionAppService, ServiceSettings, AZURE_CONDITIONS, RUNTIME_CONDITIONS};

/// App setting selecting the functions runtime version
pub const RUNTIME_VERSION_SETTING: &str = "FUNCTIONS_EXTENSION_VERSION";

/// App setting overriding the edit mode (`readwrite` / `readonly`)
pub const EDIT_MODE_SETTING: &str = "FUNCTION_APP_EDIT_MODE";

/// App setting holding the Application Insights instrumentation key
pub const INSTRUMENTATION_KEY_SETTING: &str = "APPINSIGHTS_INSTRUMENTATIONKEY";

/// Name of the host master key entry
pub const MASTER_KEY_NAME: &str = "_master";

/// Value shown for the master key until it is revealed
pub const MASTER_KEY_PLACEHOLDER: &str = "{:val}";

/// System key the EventGrid extension registers with the host
pub const EVENT_GRID_KEY_NAME: &str = "eventgridextensionconfig_extension";

/// App setting that disables one function on the V2 runtime
pub fn disabled_setting_name(function_name: &str) -> String {
    format!("AzureWebJobs.{}.Disabled", function_name)
}
