//! OpenAI chat completions backend using strict JSON Schema output.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::usage::Usage;

use super::credentials::Credential;
use super::provider::{Backend, BackendRequest, Completion, GatewayError};

/// OpenAI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Schema name sent with `response_format`.
const SCHEMA_NAME: &str = "enrichment";

/// OpenAI backend.
pub struct OpenAiBackend {
    client: Client,
}

impl OpenAiBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build_headers(credential: &Credential) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credential.api_key))
                .map_err(|e| GatewayError::Auth(format!("Invalid API key: {}", e)))?,
        );
        Ok(headers)
    }

    fn build_body(request: &BackendRequest<'_>) -> Value {
        json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": [
                {
                    "role": "system",
                    "content": request.system_prompt
                },
                {
                    "role": "user",
                    "content": request.user_prompt
                }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": SCHEMA_NAME,
                    "strict": true,
                    "schema": request.schema
                }
            }
        })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        credential: &Credential,
        request: &BackendRequest<'_>,
    ) -> Result<Completion, GatewayError> {
        let base = credential.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));

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

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(format!("Failed to parse API response: {}", e)))?;

        let usage = api_response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

        let message = api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| GatewayError::Malformed("No choices in OpenAI response".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(GatewayError::Malformed(format!("Model refused: {}", refusal)));
        }

        let content = message
            .content
            .ok_or_else(|| GatewayError::Malformed("Empty OpenAI message".to_string()))?;

        Ok(Completion { content, usage })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
