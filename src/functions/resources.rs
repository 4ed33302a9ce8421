//! Display text
//!
//! Localization is an external capability: the service only asks a
//! [`TextLookup`] for the text behind a resource key.

use serde_json::Value;

pub const AUTH_IS_ENABLED: &str = "functionService_authIsEnabled";
pub const CLIENT_CERT_ENABLED: &str = "functionService_clientCertEnabled";
pub const ERROR_RUNNING_FUNC: &str = "functionService_errorRunningFunc";

/// Template properties that are never localized
const NON_LOCALIZED_PROPERTIES: [&str; 3] = ["files", "defaultValue", "function"];

pub trait TextLookup: Send + Sync {
    /// Text for `key`, or `None` when the key is unknown
    fn text(&self, key: &str) -> Option<String>;

    /// Text for `key` with `{{name}}` placeholders filled in; unknown keys
    /// come back unchanged
    fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.text(key).unwrap_or_else(|| key.to_string());
        for (name, value) in args {
            text = text.replace(&format!("{{{{{}}}}}", name), value);
        }
        text
    }
}

/// Built-in English texts
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultText;

impl TextLookup for DefaultText {
    fn text(&self, key: &str) -> Option<String> {
        let text = match key {
            AUTH_IS_ENABLED => {
                "Function invocation failed because authentication is enabled on the function app. \
                 Disable it to run functions from the portal."
            }
            CLIENT_CERT_ENABLED => {
                "Function invocation failed because the function app requires incoming client \
                 certificates."
            }
            ERROR_RUNNING_FUNC => {
                "There was an error running function ({{name}}). \
                 Check logs output for the full error."
            }
            _ => return None,
        };
        Some(text.to_string())
    }
}

/// Replace every `$key` string in a template document with its text
pub fn localize(value: &mut Value, text: &dyn TextLookup) {
    match value {
        Value::String(s) => {
            if let Some(key) = s.strip_prefix('$') {
                *s = text.text(key).unwrap_or_else(|| key.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                localize(item, text);
            }
        }
        Value::Object(map) => {
            for (property, item) in map.iter_mut() {
                if NON_LOCALIZED_PROPERTIES.contains(&property.as_str()) {
                    continue;
                }
                localize(item, text);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed;

    impl TextLookup for Fixed {
        fn text(&self, key: &str) -> Option<String> {
            (key == "httpTrigger_name").then(|| "HTTP trigger".to_string())
        }
    }

    #[test]
    fn test_localize_skips_code_properties() {
        let mut template = json!({
            "metadata": {"name": "$httpTrigger_name", "tags": ["$httpTrigger_name", "plain"]},
            "files": {"run.csx": "$httpTrigger_name"},
            "function": {"bindings": [{"name": "$req"}]},
            "defaultValue": "$keep"
        });

        localize(&mut template, &Fixed);

        assert_eq!(template["metadata"]["name"], "HTTP trigger");
        assert_eq!(template["metadata"]["tags"], json!(["HTTP trigger", "plain"]));
        assert_eq!(template["files"]["run.csx"], "$httpTrigger_name");
        assert_eq!(template["function"]["bindings"][0]["name"], "$req");
        assert_eq!(template["defaultValue"], "$keep");
    }

    #[test]
    fn test_format_fills_placeholders() {
        let text = DefaultText.format(ERROR_RUNNING_FUNC, &[("name", "HttpTrigger1")]);
        assert!(text.contains("(HttpTrigger1)"));
        assert_eq!(DefaultText.format("unknown_key", &[]), "unknown_key");
    }
}
