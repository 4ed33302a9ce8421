//! Operation results

use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// Why an operation did not produce a result
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("{error_id}")]
pub struct HttpError {
    #[serde(rename = "errorId")]
    pub error_id: String,
}

/// Outcome of a gated operation
///
/// Either a result or an error, never both: the only constructors are
/// [`HttpResult::success`] and [`HttpResult::failure`]. Serializes as
/// `{ isSuccessful, error, result }`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResult<T> {
    outcome: Result<T, HttpError>,
}

impl<T> HttpResult<T> {
    pub fn success(result: T) -> Self {
        Self { outcome: Ok(result) }
    }

    pub fn failure(error_id: impl Into<String>) -> Self {
        Self {
            outcome: Err(HttpError {
                error_id: error_id.into(),
            }),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn result(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&HttpError> {
        self.outcome.as_ref().err()
    }

    pub fn error_id(&self) -> Option<&str> {
        self.error().map(|e| e.error_id.as_str())
    }

    pub fn ok(self) -> Option<T> {
        self.outcome.ok()
    }

    pub fn into_result(self) -> Result<T, HttpError> {
        self.outcome
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> HttpResult<U> {
        HttpResult {
            outcome: self.outcome.map(f),
        }
    }
}

impl<T> From<Result<T, HttpError>> for HttpResult<T> {
    fn from(outcome: Result<T, HttpError>) -> Self {
        Self { outcome }
    }
}

impl<T: Serialize> Serialize for HttpResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HttpResult", 3)?;
        state.serialize_field("isSuccessful", &self.is_successful())?;
        state.serialize_field("error", &self.error())?;
        state.serialize_field("result", &self.result())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let result = HttpResult::success(vec![1, 2]);
        assert!(result.is_successful());
        assert!(result.error().is_none());
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"isSuccessful": true, "error": null, "result": [1, 2]})
        );
    }

    #[test]
    fn test_failure_shape() {
        let result: HttpResult<String> = HttpResult::failure("SiteStopped");
        assert!(!result.is_successful());
        assert!(result.result().is_none());
        assert_eq!(result.error_id(), Some("SiteStopped"));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"isSuccessful": false, "error": {"errorId": "SiteStopped"}, "result": null})
        );
    }

    #[test]
    fn test_map_keeps_failure() {
        let result: HttpResult<Vec<u8>> = HttpResult::failure("x");
        let mapped = result.map(|v| v.len());
        assert_eq!(mapped.error_id(), Some("x"));
        assert_eq!(HttpResult::success(3).map(|v| v * 2).ok(), Some(6));
    }
}
