//! The enrichment engine facade.
//!
//! [`EnrichmentEngine::process_dataset`] validates the block against the
//! dataset, checks that the integration has a credential, runs the
//! orchestrator and merges the results. It never returns an error: every
//! failure is reported in the [`EnrichmentResult`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::budget::{CostEstimator, TokenRateEstimator};
use crate::config::{EngineSettings, EnrichmentBlockConfig, validate_for_dataset};
use crate::error::{ErrorKind, Result, RowError};
use crate::gateway::{CredentialResolver, Gateway, ProviderGateway};
use crate::merge::merge;
use crate::orchestrator::Orchestrator;
use crate::usage::Usage;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Why a run ended in [`RunState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunFailure {
    /// The block or dataset failed validation; nothing was sent.
    InvalidConfig,
    /// No credential could be resolved for the integration.
    CredentialsUnavailable,
    /// The caller cancelled the run.
    Cancelled,
}

/// Output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    /// Headers of the enriched table.
    pub new_headers: Vec<String>,
    /// Rows of the enriched table, in source order.
    pub new_rows: Vec<Vec<String>>,
    /// Source rows actually sent to a provider.
    pub processed_row_count: usize,
    /// One entry per failed unit, plus run-level errors.
    pub errors: Vec<RowError>,
    /// Final state of the run.
    pub state: RunState,
    /// Why the run failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    /// Token usage summed over successful calls.
    pub usage: Usage,
    /// Spend settled by the budget tracker.
    pub spent: f64,
}

impl EnrichmentResult {
    /// A failed run: the input passes through with one top-level error.
    fn failed(headers: &[String], rows: &[Vec<String>], failure: RunFailure, error: RowError) -> Self {
        Self {
            new_headers: headers.to_vec(),
            new_rows: rows.to_vec(),
            processed_row_count: 0,
            errors: vec![error],
            state: RunState::Failed,
            failure: Some(failure),
            usage: Usage::default(),
            spent: 0.0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

/// Composes validation, orchestration and merging into one operation.
///
/// The engine holds no state across runs; it can be cloned cheaply and
/// shared between tasks.
#[derive(Clone)]
pub struct EnrichmentEngine {
    resolver: Arc<dyn CredentialResolver>,
    gateway: Arc<dyn Gateway>,
    estimator: Arc<dyn CostEstimator>,
    settings: EngineSettings,
}

impl EnrichmentEngine {
    /// Create an engine using the built-in provider gateway.
    pub fn new(resolver: Arc<dyn CredentialResolver>) -> Result<Self> {
        let gateway = ProviderGateway::new(resolver.clone())?;
        Ok(Self::with_gateway(resolver, Arc::new(gateway)))
    }

    /// Create an engine around a custom gateway.
    pub fn with_gateway(resolver: Arc<dyn CredentialResolver>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            resolver,
            gateway,
            estimator: Arc::new(TokenRateEstimator::default()),
            settings: EngineSettings::default(),
        }
    }

    /// Replace the concurrency, timeout and retry settings.
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the estimator used for budget reservations.
    pub fn with_cost_estimator(mut self, estimator: Arc<dyn CostEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Concurrency, timeout and retry settings used for runs.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Enrich a dataset.
    pub async fn process_dataset(
        &self,
        config: &EnrichmentBlockConfig,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> EnrichmentResult {
        self.process_dataset_with_cancel(config, headers, rows, CancellationToken::new())
            .await
    }

    /// Enrich a dataset, stopping early when `cancel` fires.
    pub async fn process_dataset_with_cancel(
        &self,
        config: &EnrichmentBlockConfig,
        headers: &[String],
        rows: &[Vec<String>],
        cancel: CancellationToken,
    ) -> EnrichmentResult {
        let (state, _) = watch::channel(RunState::Idle);
        self.execute(config, headers, rows, &cancel, &state).await
    }

    /// Run on the tokio runtime and return a handle to observe or cancel it.
    pub fn spawn(
        &self,
        config: EnrichmentBlockConfig,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> RunHandle {
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let cancel = CancellationToken::new();
        let engine = self.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            engine
                .execute(&config, &headers, &rows, &token, &state_tx)
                .await
        });

        RunHandle {
            state: state_rx,
            cancel,
            task,
        }
    }

    async fn execute(
        &self,
        config: &EnrichmentBlockConfig,
        headers: &[String],
        rows: &[Vec<String>],
        cancel: &CancellationToken,
        state: &watch::Sender<RunState>,
    ) -> EnrichmentResult {
        state.send_replace(RunState::Running);
        let result = self.run(config, headers, rows, cancel).await;
        state.send_replace(result.state);
        result
    }

    async fn run(
        &self,
        config: &EnrichmentBlockConfig,
        headers: &[String],
        rows: &[Vec<String>],
        cancel: &CancellationToken,
    ) -> EnrichmentResult {
        info!(
            integration = %config.integration_name,
            model = %config.model,
            rows = rows.len(),
            outputs = config.outputs.len(),
            "Starting enrichment run"
        );

        let violations = validate_for_dataset(config, headers, rows);
        if !violations.is_empty() {
            let message = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(violations = violations.len(), "Configuration rejected");
            return EnrichmentResult::failed(
                headers,
                rows,
                RunFailure::InvalidConfig,
                RowError::run(ErrorKind::Config, message),
            );
        }

        if !self.resolver.has_credential(&config.integration_name) {
            warn!(integration = %config.integration_name, "No credential for integration");
            return EnrichmentResult::failed(
                headers,
                rows,
                RunFailure::CredentialsUnavailable,
                RowError::run(
                    ErrorKind::Auth,
                    format!(
                        "no credential available for integration '{}'",
                        config.integration_name
                    ),
                ),
            );
        }

        let orchestrator = Orchestrator::new(
            self.gateway.clone(),
            self.estimator.clone(),
            self.settings.clone(),
        );
        let outcome = orchestrator.run(config, headers, rows, cancel).await;

        let working_rows = config.working_row_count(rows.len());
        let table = merge(headers, rows, config, &outcome.results, working_rows);

        let mut errors = outcome.errors;
        let (state, failure) = if outcome.cancelled {
            errors.push(RowError::run(ErrorKind::Cancelled, "run cancelled"));
            (RunState::Failed, Some(RunFailure::Cancelled))
        } else {
            (RunState::Succeeded, None)
        };

        info!(
            processed = outcome.processed_row_count,
            errors = errors.len(),
            state = ?state,
            "Enrichment run finished"
        );

        EnrichmentResult {
            new_headers: table.new_headers,
            new_rows: table.new_rows,
            processed_row_count: outcome.processed_row_count,
            errors,
            state,
            failure,
            usage: outcome.usage,
            spent: outcome.spent,
        }
    }
}

/// Handle to a spawned run.
pub struct RunHandle {
    state: watch::Receiver<RunState>,
    cancel: CancellationToken,
    task: JoinHandle<EnrichmentResult>,
}

impl RunHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// Stop dispatching and abandon in-flight calls.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> Result<EnrichmentResult> {
        Ok(self.task.await?)
    }
}
