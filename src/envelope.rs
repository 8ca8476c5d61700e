use crate::errors::{Kind, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Uniform success/failure shape returned by every action. `success=true`
/// implies `data` present and `error` absent; `success=false` implies the
/// reverse. `metadata` is always optional.
///
/// Also the wire shape the remote proxy (C6) deserializes a peer registry's
/// response into, so this derives `Deserialize` too even though nothing
/// local ever parses JSON back into an `Envelope`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
            metadata: None,
        }
    }

    pub fn ok_with_metadata(data: Value, metadata: HashMap<String, Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
            metadata: Some(metadata),
        }
    }

    pub fn err(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            kind: Some(kind),
            metadata: None,
        }
    }

    pub fn http_status(&self) -> axum::http::StatusCode {
        match self.kind {
            Some(kind) => kind.http_status(),
            None => axum::http::StatusCode::OK,
        }
    }
}

impl From<&RegistryError> for Envelope {
    fn from(err: &RegistryError) -> Self {
        Envelope::err(err.kind(), err.message())
    }
}

impl From<RegistryError> for Envelope {
    fn from(err: RegistryError) -> Self {
        Envelope::err(err.kind(), err.message())
    }
}

/// Convert a `Result<Value, RegistryError>` into an envelope. The common
/// pattern at every C4/C5/C6 boundary.
pub fn envelope_from(result: crate::errors::Result<Value>) -> Envelope {
    match result {
        Ok(data) => Envelope::ok(data),
        Err(e) => Envelope::from(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_serializes_without_error_fields() {
        let env = Envelope::ok(json!({"text": "hi"}));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["success"], json!(true));
        assert_eq!(v["data"], json!({"text": "hi"}));
        assert!(v.get("error").is_none());
        assert!(v.get("kind").is_none());
    }

    #[test]
    fn failure_serializes_without_data() {
        let env = Envelope::err(Kind::Validation, "missing required parameter: text");
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["success"], json!(false));
        assert_eq!(v["kind"], json!("validation"));
        assert!(v.get("data").is_none());
    }

    #[test]
    fn totality_exactly_one_of_success_or_failure() {
        let ok = Envelope::ok(json!(1));
        assert!(ok.success && ok.error.is_none());
        let err = Envelope::err(Kind::Internal, "boom");
        assert!(!err.success && err.data.is_none());
    }
}
