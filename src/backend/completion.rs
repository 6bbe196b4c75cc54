//! Backend for a llama.cpp style `/completion` HTTP endpoint.
//!
//! The frame travels inline as base64 JPEG in `image_data` and is referenced
//! from the prompt by the `<image_data>` placeholder.

use crate::backend::{GenerationOptions, InferenceBackend};
use crate::error::{DrishtiError, Result};
use crate::frame::Frame;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Slot id the server binds the inline image to.
const IMAGE_SLOT_ID: u32 = 10;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: String,
    image_data: Vec<ImageData<'a>>,
    n_predict: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ImageData<'a> {
    data: &'a str,
    id: u32,
}

/// HTTP completion backend.
pub struct CompletionBackend {
    client: reqwest::Client,
    url: String,
    options: GenerationOptions,
    timeout: Duration,
}

impl CompletionBackend {
    pub fn new(url: &str, options: GenerationOptions, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DrishtiError::Backend {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
            options,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Wrap a user prompt in the chat template the endpoint expects.
fn completion_prompt(prompt: &str) -> String {
    format!("User: {prompt}\n<image_data>\nAssistant:")
}

/// Pull the generated text out of the endpoint's reply.
///
/// Servers disagree on the field name; `content` wins over `response`, and
/// anything else is passed through as raw JSON text.
fn extract_text(reply: &Value) -> String {
    let field = |name: &str| {
        reply
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let text = match reply {
        Value::Object(_) => field("content")
            .or_else(|| field("response"))
            .unwrap_or_else(|| reply.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.trim().to_string()
}

#[async_trait::async_trait]
impl InferenceBackend for CompletionBackend {
    async fn infer(&self, frame: &Frame, prompt: &str) -> Result<String> {
        self.infer_with(frame, prompt, self.options).await
    }

    async fn infer_with(
        &self,
        frame: &Frame,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String> {
        let jpeg = frame.encode_jpeg()?;
        let encoded = STANDARD.encode(jpeg);

        let body = CompletionRequest {
            prompt: completion_prompt(prompt),
            image_data: vec![ImageData {
                data: &encoded,
                id: IMAGE_SLOT_ID,
            }],
            n_predict: options.n_predict,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DrishtiError::BackendTimeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    DrishtiError::IpcConnection {
                        message: format!("Completion endpoint {} unreachable: {e}", self.url),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(DrishtiError::Backend {
                message: format!("Completion endpoint returned status {}", response.status()),
            });
        }

        let reply: Value = response.json().await.map_err(|e| DrishtiError::IpcProtocol {
            message: format!("Completion reply is not JSON: {e}"),
        })?;

        Ok(extract_text(&reply))
    }

    fn name(&self) -> &str {
        "completion"
    }
}
