//! Gateway that routes each request to the backend of its credential.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{EnrichError, Result};

use super::anthropic::AnthropicBackend;
use super::credentials::{BackendKind, CredentialResolver};
use super::mock::MockBackend;
use super::ollama::OllamaBackend;
use super::openai::OpenAiBackend;
use super::prompts;
use super::provider::{Backend, BackendRequest, Gateway, GatewayError, GatewayRequest, GatewayResponse};

/// Default [`Gateway`]: resolves the credential, calls the matching backend
/// and validates the answer against the request's contract.
pub struct ProviderGateway {
    resolver: Arc<dyn CredentialResolver>,
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl ProviderGateway {
    /// Create a gateway with the built-in backends sharing one HTTP client.
    pub fn new(resolver: Arc<dyn CredentialResolver>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| EnrichError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let mut backends: HashMap<BackendKind, Arc<dyn Backend>> = HashMap::new();
        backends.insert(BackendKind::OpenAi, Arc::new(OpenAiBackend::new(client.clone())));
        backends.insert(BackendKind::Anthropic, Arc::new(AnthropicBackend::new(client.clone())));
        backends.insert(BackendKind::Ollama, Arc::new(OllamaBackend::new(client)));
        backends.insert(BackendKind::Mock, Arc::new(MockBackend::new()));

        Ok(Self { resolver, backends })
    }

    /// Replace the backend used for one kind.
    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }
}

#[async_trait]
impl Gateway for ProviderGateway {
    async fn call(&self, request: &GatewayRequest) -> std::result::Result<GatewayResponse, GatewayError> {
        let credential = self.resolver.resolve(&request.integration_name).ok_or_else(|| {
            GatewayError::Auth(format!(
                "no credential for integration '{}'",
                request.integration_name
            ))
        })?;

        let backend = self.backends.get(&credential.backend).ok_or_else(|| {
            GatewayError::Auth(format!("no backend registered for '{}'", credential.backend))
        })?;

        let schema = request.contract.to_json_schema();
        let backend_request = BackendRequest {
            model: &request.model,
            temperature: request.temperature,
            system_prompt: prompts::system_prompt(&request.contract, &schema),
            user_prompt: &request.prompt,
            schema,
            contract: &request.contract,
        };

        debug!(
            backend = backend.name(),
            model = %request.model,
            fields = request.contract.fields.len(),
            "Calling backend"
        );

        let completion = backend.complete(&credential, &backend_request).await?;

        let values = request
            .contract
            .parse_response(&completion.content)
            .map_err(|violation| {
                warn!(backend = backend.name(), %violation, "Response violates contract");
                GatewayError::Malformed(violation.to_string())
            })?;

        Ok(GatewayResponse {
            values,
            usage: completion.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputSpec;
    use crate::contract::build_contract;
    use crate::gateway::credentials::{Credential, StaticCredentials};
    use crate::gateway::provider::Completion;

    struct FixedBackend(&'static str);

    #[async_trait]
    impl Backend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _credential: &Credential,
            _request: &BackendRequest<'_>,
        ) -> std::result::Result<Completion, GatewayError> {
            Ok(Completion {
                content: self.0.to_string(),
                usage: None,
            })
        }
    }

    fn request(integration: &str) -> GatewayRequest {
        let output = OutputSpec::category("Sentiment", "p", ["positive", "negative"]);
        GatewayRequest {
            integration_name: integration.into(),
            model: "m".into(),
            temperature: 0.0,
            prompt: "How does it feel?".into(),
            contract: build_contract(&[&output]),
        }
    }

    fn gateway(content: &'static str) -> ProviderGateway {
        let store = StaticCredentials::new().with("openai", Credential::new(BackendKind::OpenAi, "k"));
        ProviderGateway::new(Arc::new(store))
            .unwrap()
            .with_backend(BackendKind::OpenAi, Arc::new(FixedBackend(content)))
    }

    #[tokio::test]
    async fn test_routes_and_validates() {
        let response = gateway(r#"{"Sentiment": "positive"}"#)
            .call(&request("myOpenAI"))
            .await
            .unwrap();
        assert_eq!(response.values["Sentiment"].value.to_cell(), "positive");
    }

    #[tokio::test]
    async fn test_contract_violation_is_malformed() {
        let err = gateway(r#"{"Sentiment": "mixed"}"#)
            .call(&request("openai"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth() {
        let err = gateway("{}").call(&request("gemini")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }
}
