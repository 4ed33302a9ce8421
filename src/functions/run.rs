//! Test runs of HTTP-triggered functions

use super::models::{FunctionInfo, HttpRunModel, RunFunctionResult};
use super::resources::{self, TextLookup};
use crate::cache::{status_code_to_text, CacheError, HttpResponse};

/// Resolve a route template against the run model
///
/// `{name}` and `{name:constraint}` tokens are replaced by the query parameter
/// of the same name, and those parameters are not repeated in the query
/// string. Any query already on the template is dropped. The key from
/// `model.code` goes first, followed by the remaining parameters.
pub fn build_run_url(template: &str, model: &HttpRunModel) -> String {
    let base = template
        .split_once('?')
        .map(|(base, _)| base)
        .unwrap_or(template);

    let mut url = String::with_capacity(base.len());
    let mut route_params: Vec<String> = Vec::new();
    let mut rest = base;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let token = &rest[start..=start + len];
        let name = token[1..token.len() - 1]
            .split(':')
            .next()
            .unwrap_or_default()
            .trim_end_matches('?');

        url.push_str(&rest[..start]);
        match model.query_string_params.iter().find(|p| p.name == name) {
            Some(param) => url.push_str(&urlencoding::encode(&param.value)),
            None => url.push_str(token),
        }
        route_params.push(name.to_string());
        rest = &rest[start + len + 1..];
    }
    url.push_str(rest);

    let query = model
        .code
        .iter()
        .chain(
            model
                .query_string_params
                .iter()
                .filter(|p| !route_params.contains(&p.name)),
        )
        .map(|p| format!("{}={}", urlencoding::encode(&p.name), urlencoding::encode(&p.value)))
        .collect::<Vec<_>>()
        .join("&");

    if query.is_empty() {
        url
    } else {
        format!("{}?{}", url, query)
    }
}

/// JSON unless the function is a plain HTTP trigger (no webhook type)
pub fn run_content_type(function: &FunctionInfo) -> Option<&'static str> {
    match function.config.http_trigger() {
        Some(trigger) if trigger.web_hook_type.is_none() => None,
        _ => Some("application/json"),
    }
}

/// Site flags consulted when a run fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFailureContext {
    pub easy_auth_enabled: bool,
    pub client_cert_enabled: bool,
}

pub fn run_result(response: &HttpResponse) -> RunFunctionResult {
    RunFunctionResult {
        status_code: response.status,
        status_text: status_code_to_text(response.status).to_string(),
        content: response.body.clone(),
    }
}

/// Turn a failed run into something the run panel can show
pub fn translate_run_failure(
    error: &CacheError,
    site: RunFailureContext,
    function_name: &str,
    text: &dyn TextLookup,
) -> RunFunctionResult {
    let (status, content) = if site.easy_auth_enabled {
        (401, text.format(resources::AUTH_IS_ENABLED, &[]))
    } else if site.client_cert_enabled {
        (401, text.format(resources::CLIENT_CERT_ENABLED, &[]))
    } else {
        match error {
            CacheError::Network { status: 200, .. } => (
                502,
                text.format(resources::ERROR_RUNNING_FUNC, &[("name", function_name)]),
            ),
            CacheError::Network { status: 0, .. } => (0, String::new()),
            CacheError::Status { status, body, .. } => (*status, pretty_body(body)),
            other => (other.status().unwrap_or(0), other.to_string()),
        }
    };

    RunFunctionResult {
        status_code: status,
        status_text: status_code_to_text(status).to_string(),
        content,
    }
}

/// Pretty-print a JSON body; anything else is returned as is
fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::models::{BindingInfo, FunctionConfig, NameValuePair};
    use crate::functions::resources::DefaultText;

    fn model(params: &[(&str, &str)], code: Option<(&str, &str)>) -> HttpRunModel {
        HttpRunModel {
            method: "get".into(),
            query_string_params: params.iter().map(|(n, v)| NameValuePair::new(*n, *v)).collect(),
            code: code.map(|(n, v)| NameValuePair::new(n, v)),
            ..Default::default()
        }
    }

    #[test]
    fn test_route_token_substitution() {
        let url = build_run_url("https://app/api/{name}", &model(&[("name", "foo")], None));
        assert_eq!(url, "https://app/api/foo");
    }

    #[test]
    fn test_constraint_tokens_and_leftover_params() {
        let url = build_run_url(
            "https://app/api/items/{id:int}/{category?}?stale=1",
            &model(&[("id", "42"), ("category", "tools"), ("q", "a b")], Some(("code", "k1"))),
        );
        assert_eq!(url, "https://app/api/items/42/tools?code=k1&q=a%20b");
    }

    #[test]
    fn test_missing_param_keeps_token() {
        let url = build_run_url("https://app/api/{name}", &model(&[], Some(("code", "k"))));
        assert_eq!(url, "https://app/api/{name}?code=k");
    }

    #[test]
    fn test_content_type_rule() {
        let mut function = FunctionInfo::default();
        assert_eq!(run_content_type(&function), Some("application/json"));

        function.config = FunctionConfig {
            bindings: vec![BindingInfo {
                binding_type: "httpTrigger".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(run_content_type(&function), None);

        function.config.bindings[0].web_hook_type = Some("genericJson".into());
        assert_eq!(run_content_type(&function), Some("application/json"));
    }

    #[test]
    fn test_failure_translation_priority() {
        let upstream = CacheError::Status {
            url: "u".into(),
            status: 500,
            body: r#"{"message":"boom"}"#.into(),
        };
        let both = RunFailureContext {
            easy_auth_enabled: true,
            client_cert_enabled: true,
        };

        let result = translate_run_failure(&upstream, both, "f", &DefaultText);
        assert_eq!(result.status_code, 401);
        assert!(result.content.contains("authentication is enabled"));

        let cert = RunFailureContext {
            client_cert_enabled: true,
            ..Default::default()
        };
        let result = translate_run_failure(&upstream, cert, "f", &DefaultText);
        assert!(result.content.contains("client certificates"));

        let result =
            translate_run_failure(&upstream, RunFailureContext::default(), "f", &DefaultText);
        assert_eq!(result.status_code, 500);
        assert_eq!(result.status_text, "Internal Server Error");
        assert_eq!(result.content, "{\n  \"message\": \"boom\"\n}");
    }

    #[test]
    fn test_network_failures() {
        let unread = CacheError::Network {
            url: "u".into(),
            status: 200,
            message: "body".into(),
        };
        let result = translate_run_failure(
            &unread,
            RunFailureContext::default(),
            "HttpTrigger1",
            &DefaultText,
        );
        assert_eq!(result.status_code, 502);
        assert!(result.content.contains("HttpTrigger1"));

        let refused = CacheError::Network {
            url: "u".into(),
            status: 0,
            message: "connection refused".into(),
        };
        let result =
            translate_run_failure(&refused, RunFailureContext::default(), "f", &DefaultText);
        assert_eq!(result.status_code, 0);
        assert!(result.content.is_empty());
    }

    #[test]
    fn test_plain_text_body_passes_through() {
        let upstream = CacheError::Status {
            url: "u".into(),
            status: 400,
            body: "not json".into(),
        };
        let result =
            translate_run_failure(&upstream, RunFailureContext::default(), "f", &DefaultText);
        assert_eq!(result.content, "not json");
    }
}
