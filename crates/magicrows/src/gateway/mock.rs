//! Mock backend for offline runs and testing.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::usage::Usage;

use super::credentials::Credential;
use super::provider::{Backend, BackendRequest, Completion, GatewayError};

/// Backend that answers every request with a contract-conforming sample.
///
/// Each call uses the next seed, so successive rows get distinct values.
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        _credential: &Credential,
        request: &BackendRequest<'_>,
    ) -> Result<Completion, GatewayError> {
        let seed = self.calls.fetch_add(1, Ordering::Relaxed);
        let content = request.contract.sample_response(seed).to_string();

        // Rough token estimate: four characters per token
        let usage = Usage::new(
            ((request.system_prompt.len() + request.user_prompt.len()) / 4) as u64,
            (content.len() / 4) as u64,
        );

        Ok(Completion {
            content,
            usage: Some(usage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputSpec;
    use crate::contract::build_contract;
    use crate::gateway::credentials::BackendKind;

    #[tokio::test]
    async fn test_mock_completion_satisfies_contract() {
        let output = OutputSpec::category("Sentiment", "p", ["positive", "negative"]);
        let contract = build_contract(&[&output]);
        let request = BackendRequest {
            model: "mock",
            temperature: 0.0,
            system_prompt: String::new(),
            user_prompt: "How does this feel?",
            schema: contract.to_json_schema(),
            contract: &contract,
        };
        let backend = MockBackend::new();
        let credential = Credential::new(BackendKind::Mock, "");

        for _ in 0..3 {
            let completion = backend.complete(&credential, &request).await.unwrap();
            assert!(contract.parse_response(&completion.content).is_ok());
            assert_eq!(completion.usage.unwrap().requests, 1);
        }
        assert_eq!(backend.calls(), 3);
    }
}
