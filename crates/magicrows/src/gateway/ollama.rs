//! Ollama local backend.
//!
//! Ollama runs models locally without API keys. The contract's schema is
//! passed as the `format` parameter so the model is constrained to it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::usage::Usage;

use super::credentials::Credential;
use super::provider::{Backend, BackendRequest, Completion, GatewayError};

/// Default Ollama host.
const DEFAULT_HOST: &str = "http://localhost:11434";

/// Ollama local backend.
pub struct OllamaBackend {
    client: Client,
}

impl OllamaBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build_body(request: &BackendRequest<'_>) -> Value {
        json!({
            "model": request.model,
            "stream": false,
            "format": request.schema,
            "options": {
                "temperature": request.temperature
            },
            "messages": [
                {
                    "role": "system",
                    "content": request.system_prompt
                },
                {
                    "role": "user",
                    "content": request.user_prompt
                }
            ]
        })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        credential: &Credential,
        request: &BackendRequest<'_>,
    ) -> Result<Completion, GatewayError> {
        let host = credential.base_url.as_deref().unwrap_or(DEFAULT_HOST);
        let url = format!("{}/api/chat", host.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    GatewayError::Network(format!(
                        "Failed to connect to Ollama at {}. Is it running? Start with: ollama serve",
                        host
                    ))
                } else {
                    GatewayError::from_transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if error_text.contains("not found") {
                return Err(GatewayError::Network(format!(
                    "Model '{}' not found. Pull it with: ollama pull {}",
                    request.model, request.model
                )));
            }
            return Err(GatewayError::from_status(status, &error_text));
        }

        let api_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(format!("Failed to parse Ollama response: {}", e)))?;

        let usage = match (api_response.prompt_eval_count, api_response.eval_count) {
            (None, None) => None,
            (input, output) => Some(Usage::new(input.unwrap_or(0), output.unwrap_or(0))),
        };

        Ok(Completion {
            content: api_response.message.content,
            usage,
        })
    }
}

/// Ollama chat response structure.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}
