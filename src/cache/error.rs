//! Error types for resource cache calls

use thiserror::Error;

/// Errors that can occur while talking to the resource API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// Upstream answered with a non-2xx status.
    #[error("request to {url} failed with status {status}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Transport failure. `status` is 0 when no response arrived at all, or the
    /// response status when the body could not be read.
    #[error("network error calling {url} (status {status}): {message}")]
    Network {
        url: String,
        status: u16,
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    /// No access token could be resolved for the call.
    #[error("failed to resolve access token: {0}")]
    Auth(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    Request(String),
}

impl CacheError {
    /// HTTP status attached to this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CacheError::Status { status, .. } | CacheError::Network { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable, best-effort identifier reported in failed results
    pub fn error_id(&self) -> String {
        match self {
            CacheError::Status { status, .. } => {
                format!("{} {}", status, status_code_to_text(*status))
            }
            CacheError::Network { .. } => "NetworkError".to_string(),
            CacheError::Parse { .. } => "ParseError".to_string(),
            CacheError::Auth(_) => "TokenUnavailable".to_string(),
            CacheError::Request(_) => "InvalidRequest".to_string(),
        }
    }
}

/// Reason phrase for an HTTP status code, falling back to its class
pub fn status_code_to_text(code: u16) -> &'static str {
    match code {
        0 => "Unknown HTTP Error",
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        306 => "(Unused)",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => match code / 100 {
            1 => "Informational",
            2 => "Success",
            3 => "Redirection",
            4 => "Client Error",
            5 => "Server Error",
            _ => "Unknown Status Code",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_falls_back_to_class() {
        assert_eq!(status_code_to_text(404), "Not Found");
        assert_eq!(status_code_to_text(418), "Client Error");
        assert_eq!(status_code_to_text(599), "Server Error");
        assert_eq!(status_code_to_text(999), "Unknown Status Code");
    }

    #[test]
    fn test_error_ids() {
        let status = CacheError::Status {
            url: "u".into(),
            status: 409,
            body: String::new(),
        };
        assert_eq!(status.error_id(), "409 Conflict");
        assert_eq!(status.status(), Some(409));

        let network = CacheError::Network {
            url: "u".into(),
            status: 0,
            message: "refused".into(),
        };
        assert_eq!(network.error_id(), "NetworkError");
        assert_eq!(network.status(), Some(0));

        assert_eq!(CacheError::Auth("x".into()).status(), None);
    }
}
