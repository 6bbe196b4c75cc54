//! JSON message protocol spoken with the long-lived inference server.
//!
//! Every request is one JSON object carrying a caller-assigned `id` and
//! exactly one operation key:
//!
//! ```text
//! {"id":1,"init":{"model_path":"..."}}
//! {"id":2,"clear_kv_cache":{}}
//! {"id":3,"infer":{"image_path":"...","prompt":"...","n_predict":64}}
//! ```
//!
//! The server answers `{"id":3,"success":true,"result":{"text":"..."}}` or
//! `{"id":3,"success":false,"error":"..."}`, echoing the request id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request to the inference server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub operation: Operation,
}

/// Operation keyed by its field name on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Load the model; must precede any `infer`
    Init { model_path: String },
    /// Drop cross-request inference state
    ClearKvCache {},
    /// Answer `prompt` about the image at `image_path`
    Infer {
        image_path: String,
        prompt: String,
        n_predict: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
    },
}

impl Operation {
    /// Wire name of the operation, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Init { .. } => "init",
            Operation::ClearKvCache {} => "clear_kv_cache",
            Operation::Infer { .. } => "infer",
        }
    }
}

/// A request that could not be understood.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRequest {
    /// Echoed id, or 0 when none could be read
    pub id: u64,
    pub message: String,
}

impl Request {
    pub fn new(id: u64, operation: Operation) -> Self {
        Self { id, operation }
    }

    /// Serialize request to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a raw request, keeping the id when only the operation is broken.
    pub fn parse(bytes: &[u8]) -> Result<Self, MalformedRequest> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| MalformedRequest {
            id: 0,
            message: format!("Request is not valid JSON: {}", e),
        })?;

        let id = value.get("id").and_then(Value::as_u64).unwrap_or(0);
        if !value.is_object() {
            return Err(MalformedRequest {
                id,
                message: "Request must be a JSON object".to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| MalformedRequest {
            id,
            message: format!("Malformed request: {}", e),
        })
    }
}

/// Text payload of a successful `infer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferResult {
    pub text: String,
}

/// Reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<InferResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Success without a payload (`init`, `clear_kv_cache`)
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            success: true,
            result: None,
            error: None,
        }
    }

    /// Success carrying generated text (`infer`)
    pub fn text(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            success: true,
            result: Some(InferResult { text: text.into() }),
            error: None,
        }
    }

    /// Well-formed failure
    pub fn failure(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<MalformedRequest> for Response {
    fn from(bad: MalformedRequest) -> Self {
        Response::failure(bad.id, bad.message)
    }
}
