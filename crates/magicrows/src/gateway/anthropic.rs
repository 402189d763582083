//! Anthropic Messages API backend.
//!
//! Structured output is obtained by forcing a single tool call whose input
//! schema is the contract's JSON Schema.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::usage::Usage;

use super::credentials::Credential;
use super::provider::{Backend, BackendRequest, Completion, GatewayError};

/// Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version.
const API_VERSION: &str = "2023-06-01";

const MAX_TOKENS: u32 = 4096;

/// Name of the forced tool.
const TOOL_NAME: &str = "record_enrichment";

/// Anthropic Claude backend.
pub struct AnthropicBackend {
    client: Client,
}

impl AnthropicBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build_headers(credential: &Credential) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&credential.api_key)
                .map_err(|e| GatewayError::Auth(format!("Invalid API key: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn build_body(request: &BackendRequest<'_>) -> Value {
        json!({
            "model": request.model,
            "max_tokens": MAX_TOKENS,
            "temperature": request.temperature,
            "system": request.system_prompt,
            "messages": [
                {
                    "role": "user",
                    "content": request.user_prompt
                }
            ],
            "tools": [
                {
                    "name": TOOL_NAME,
                    "description": "Record the enrichment values for this row.",
                    "input_schema": request.schema
                }
            ],
            "tool_choice": { "type": "tool", "name": TOOL_NAME }
        })
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        credential: &Credential,
        request: &BackendRequest<'_>,
    ) -> Result<Completion, GatewayError> {
        let base = credential.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/messages", base.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .headers(Self::build_headers(credential)?)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, &error_text));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(format!("Failed to parse API response: {}", e)))?;

        let usage = api_response
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens));

        let content = extract_content(api_response.content)?;
        Ok(Completion { content, usage })
    }
}

/// Prefer the tool input; fall back to any text block.
fn extract_content(blocks: Vec<ContentBlock>) -> Result<String, GatewayError> {
    let mut text = None;
    for block in blocks {
        match block.content_type.as_str() {
            "tool_use" => {
                if let Some(input) = block.input {
                    return Ok(input.to_string());
                }
            }
            "text" if text.is_none() => text = block.text,
            _ => {}
        }
    }
    text.ok_or_else(|| GatewayError::Malformed("No tool call or text in API response".to_string()))
}

/// Anthropic API response structure.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

/// Content block in API response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}
