//! Provider gateway: one structured-output call per unit of work.
//!
//! The engine talks to a [`Gateway`]. The default [`ProviderGateway`]
//! resolves the integration's [`Credential`] through a
//! [`CredentialResolver`], sends the request to the matching [`Backend`]
//! and validates the answer against the request's contract.
//!
//! # Supported Backends
//!
//! - **OpenAI** - chat completions with strict JSON Schema output
//! - **Anthropic** - Messages API with a forced tool call
//! - **Ollama** - local models, schema passed as `format`
//! - **Mock** - contract-conforming samples, no network

mod anthropic;
mod credentials;
mod mock;
mod ollama;
mod openai;
mod prompts;
mod provider;
mod router;

pub use anthropic::AnthropicBackend;
pub use credentials::{BackendKind, Credential, CredentialResolver, StaticCredentials, lookup_keys};
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use provider::{
    Backend, BackendRequest, Completion, Gateway, GatewayError, GatewayRequest, GatewayResponse,
};
pub use router::ProviderGateway;
