//! Row orchestration: plans units of work and dispatches them.
//!
//! The orchestrator is the single writer of a run's mutable state. Workers
//! only perform the provider call (with timeout and retries) and hand their
//! outcome back; errors, results, usage and the budget are updated here as
//! each outcome arrives.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::{BudgetTracker, CostEstimator, Reservation};
use crate::config::{EngineSettings, EnrichmentBlockConfig, OutputSpec};
use crate::contract::{ParsedField, ParsedValues, build_contract};
use crate::error::{ErrorKind, RowError};
use crate::gateway::{Gateway, GatewayError, GatewayRequest, GatewayResponse};
use crate::template;
use crate::usage::Usage;

/// One provider call: a row and the outputs requested together.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Zero-based index of the source row.
    pub row_index: usize,
    /// Outputs requested by this call, in config order.
    pub output_names: Vec<String>,
    /// Whether the outputs of the row were combined into this call.
    pub combined: bool,
    /// Request sent to the gateway, prompt already resolved.
    pub request: GatewayRequest,
}

impl WorkUnit {
    /// Output name to attach to an error for this unit.
    fn error_output(&self) -> Option<String> {
        if self.combined {
            None
        } else {
            self.output_names.first().cloned()
        }
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) -> RowError {
        RowError::row(self.row_index, kind, message).with_output(self.error_output())
    }
}

/// Plan every unit for the working rows of a run, in row order.
pub fn plan_units(config: &EnrichmentBlockConfig, headers: &[String], rows: &[Vec<String>]) -> Vec<WorkUnit> {
    let working = config.working_row_count(rows.len());
    let mut units = Vec::new();

    for (row_index, row) in rows.iter().take(working).enumerate() {
        if config.combine_outputs {
            let outputs: Vec<&OutputSpec> = config.outputs.iter().collect();
            units.push(build_unit(config, headers, row, row_index, &outputs, true));
        } else {
            for output in &config.outputs {
                units.push(build_unit(config, headers, row, row_index, &[output], false));
            }
        }
    }

    units
}

fn build_unit(
    config: &EnrichmentBlockConfig,
    headers: &[String],
    row: &[String],
    row_index: usize,
    outputs: &[&OutputSpec],
    combined: bool,
) -> WorkUnit {
    let prompt = combined_prompt(config, headers, row, outputs);

    WorkUnit {
        row_index,
        output_names: outputs.iter().map(|o| o.name.clone()).collect(),
        combined,
        request: GatewayRequest {
            integration_name: config.integration_name.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            prompt,
            contract: build_contract(outputs),
        },
    }
}

/// Resolve each output's prompt; several outputs become one sectioned prompt.
fn combined_prompt(
    config: &EnrichmentBlockConfig,
    headers: &[String],
    row: &[String],
    outputs: &[&OutputSpec],
) -> String {
    let resolve = |output: &OutputSpec| {
        let columns = output.effective_context_columns(&config.context_columns);
        template::resolve(&output.prompt, headers, row, columns)
    };

    match outputs {
        [single] => resolve(single),
        _ => {
            let sections: Vec<String> = outputs
                .iter()
                .map(|output| format!("## {}\n{}", output.name, resolve(output)))
                .collect();
            format!(
                "Provide a value for each of the following fields.\n\n{}",
                sections.join("\n\n")
            )
        }
    }
}

/// Successful values keyed by row index, then output name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowResults {
    rows: BTreeMap<usize, ParsedValues>,
}

impl RowResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the values returned for a row.
    pub fn insert(&mut self, row_index: usize, values: ParsedValues) {
        self.rows.entry(row_index).or_default().extend(values);
    }

    /// Value of one output for one row, if that call succeeded.
    pub fn get(&self, row_index: usize, output_name: &str) -> Option<&ParsedField> {
        self.rows.get(&row_index)?.get(output_name)
    }

    /// Rows with at least one successful value.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything a run of the orchestrator produced.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOutput {
    /// Successful values.
    pub results: RowResults,
    /// Unit errors, in plan order (row index, then output order).
    pub errors: Vec<RowError>,
    /// Distinct source rows that were sent to a provider.
    pub processed_row_count: usize,
    /// Summed token usage of successful calls.
    pub usage: Usage,
    /// Cost settled by the budget tracker.
    pub spent: f64,
    /// The run stopped early because the caller cancelled it.
    pub cancelled: bool,
}

struct UnitOutcome {
    /// Position of the unit in the plan.
    position: usize,
    unit: WorkUnit,
    reservation: Reservation,
    result: Result<GatewayResponse, GatewayError>,
}

/// Drives the units of one run through a gateway.
pub struct Orchestrator {
    gateway: Arc<dyn Gateway>,
    estimator: Arc<dyn CostEstimator>,
    settings: EngineSettings,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn Gateway>, estimator: Arc<dyn CostEstimator>, settings: EngineSettings) -> Self {
        Self {
            gateway,
            estimator,
            settings,
        }
    }

    /// Plan and execute every unit of a run.
    pub async fn run(
        &self,
        config: &EnrichmentBlockConfig,
        headers: &[String],
        rows: &[Vec<String>],
        cancel: &CancellationToken,
    ) -> OrchestratorOutput {
        let units = plan_units(config, headers, rows);
        let budget = BudgetTracker::new(config.budget);

        info!(
            rows = config.working_row_count(rows.len()),
            units = units.len(),
            concurrency = self.settings.max_concurrency,
            "Dispatching units"
        );

        self.dispatch(units, budget, cancel).await
    }

    /// Execute already planned units with bounded concurrency.
    pub async fn dispatch(
        &self,
        units: Vec<WorkUnit>,
        mut budget: BudgetTracker,
        cancel: &CancellationToken,
    ) -> OrchestratorOutput {
        let max_in_flight = self.settings.max_concurrency.max(1);
        let mut output = OrchestratorOutput::default();
        let mut dispatched_rows = HashSet::new();
        let mut pending = units.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut failures: Vec<(usize, RowError)> = Vec::new();
        let mut halted = false;

        loop {
            if cancel.is_cancelled() {
                output.cancelled = true;
                break;
            }

            while !halted && in_flight.len() < max_in_flight {
                let Some((position, unit)) = pending.next() else {
                    break;
                };

                let estimate = self.estimator.estimate(&unit.request);
                match budget.try_reserve(estimate) {
                    Some(reservation) => {
                        debug!(
                            row = unit.row_index,
                            outputs = ?unit.output_names,
                            estimate,
                            "Dispatching unit"
                        );
                        dispatched_rows.insert(unit.row_index);
                        in_flight.push(self.execute(position, unit, reservation));
                    }
                    None => {
                        warn!(
                            row = unit.row_index,
                            spent = budget.spent(),
                            reserved = budget.reserved(),
                            limit = ?budget.limit(),
                            "Budget would be exceeded, halting dispatch"
                        );
                        let message = format!(
                            "budget of {} would be exceeded",
                            budget.limit().unwrap_or_default()
                        );
                        failures.push((position, unit.error(ErrorKind::BudgetExceeded, &message)));
                        for (position, skipped) in pending.by_ref() {
                            failures.push((position, skipped.error(ErrorKind::BudgetExceeded, &message)));
                        }
                        halted = true;
                    }
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(abandoned = in_flight.len(), "Run cancelled");
                    output.cancelled = true;
                    break;
                }
                Some(outcome) = in_flight.next() => {
                    if let Some(failure) = self.record(outcome, &mut budget, &mut output) {
                        failures.push(failure);
                    }
                }
            }
        }

        failures.sort_by_key(|(position, _)| *position);
        output.errors = failures.into_iter().map(|(_, error)| error).collect();
        output.processed_row_count = dispatched_rows.len();
        output.spent = budget.spent();

        info!(
            processed = output.processed_row_count,
            errors = output.errors.len(),
            requests = output.usage.requests,
            spent = output.spent,
            cancelled = output.cancelled,
            "Units finished"
        );

        output
    }

    /// Fold a finished unit into the output; a failure is handed back with
    /// its plan position.
    fn record(
        &self,
        outcome: UnitOutcome,
        budget: &mut BudgetTracker,
        output: &mut OrchestratorOutput,
    ) -> Option<(usize, RowError)> {
        let UnitOutcome {
            position,
            unit,
            reservation,
            result,
        } = outcome;

        match result {
            Ok(response) => {
                let actual = response.usage.as_ref().and_then(|u| self.estimator.actual(u));
                budget.settle(reservation, actual);
                if let Some(usage) = response.usage {
                    output.usage += usage;
                }
                output.results.insert(unit.row_index, response.values);
                None
            }
            Err(err) => {
                budget.release(reservation);
                warn!(
                    row = unit.row_index,
                    outputs = ?unit.output_names,
                    error = %err,
                    "Unit failed"
                );
                Some((position, unit.error(err.kind(), err.to_string())))
            }
        }
    }

    async fn execute(&self, position: usize, unit: WorkUnit, reservation: Reservation) -> UnitOutcome {
        let result = self.call_with_retry(&unit).await;
        UnitOutcome {
            position,
            unit,
            reservation,
            result,
        }
    }

    /// One gateway call with a deadline, retried on rate limits and timeouts.
    async fn call_with_retry(&self, unit: &WorkUnit) -> Result<GatewayResponse, GatewayError> {
        let deadline = self.settings.request_timeout;
        let attempt = || async {
            match tokio::time::timeout(deadline, self.gateway.call(&unit.request)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(format!(
                    "no response within {}ms",
                    deadline.as_millis()
                ))),
            }
        };

        attempt
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(GatewayError::is_retryable)
            .notify(|err: &GatewayError, delay| {
                warn!(
                    row = unit.row_index,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Retrying provider call"
                );
            })
            .await
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.settings.backoff_min)
            .with_max_delay(self.settings.backoff_max)
            .with_max_times(self.settings.max_attempts.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> EnrichmentBlockConfig {
        EnrichmentBlockConfig::new("mock", "m", OutputFormat::NewColumns)
            .with_context_columns(["company"])
            .with_output(OutputSpec::text("Summary", "Summarize {{company}}"))
            .with_output(OutputSpec::url("Site", "Website of {{ company }}"))
    }

    fn dataset() -> (Vec<String>, Vec<Vec<String>>) {
        let headers = strings(&["id", "company"]);
        let rows = (1..=5)
            .map(|i| vec![i.to_string(), format!("Co{}", i)])
            .collect();
        (headers, rows)
    }

    #[test]
    fn test_plan_combined_one_unit_per_row() {
        let (headers, rows) = dataset();
        let units = plan_units(&config(), &headers, &rows);

        // Preview mode caps at three rows
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.combined && u.output_names.len() == 2));
        assert!(units[1].request.prompt.contains("## Summary\nSummarize Co2"));
        assert!(units[1].request.prompt.contains("## Site\nWebsite of Co2"));
        assert_eq!(units[1].request.contract.fields.len(), 2);
    }

    #[test]
    fn test_plan_separate_one_unit_per_output() {
        let (headers, rows) = dataset();
        let config = config()
            .with_mode(crate::config::RunMode::Full)
            .with_combine_outputs(false);
        let units = plan_units(&config, &headers, &rows);

        assert_eq!(units.len(), 10);
        assert_eq!(units[0].request.prompt, "Summarize Co1");
        assert_eq!(units[1].request.prompt, "Website of Co1");
        assert_eq!(units[1].error_output().as_deref(), Some("Site"));
        assert_eq!(units[1].request.contract.fields.len(), 1);
    }

    #[test]
    fn test_plan_uses_per_output_context_columns() {
        let headers = strings(&["company", "country"]);
        let rows = vec![strings(&["Acme", "PL"])];
        let config = EnrichmentBlockConfig::new("mock", "m", OutputFormat::NewColumns)
            .with_context_columns(["company"])
            .with_output(
                OutputSpec::text("Market", "{{company}} in {{country}}")
                    .with_context_columns(["company", "country"]),
            );

        let units = plan_units(&config, &headers, &rows);
        assert_eq!(units[0].request.prompt, "Acme in PL");
    }

    #[test]
    fn test_row_results_merge_separate_units() {
        use crate::contract::{FieldValue, OutputValue};

        let field = |s: &str| ParsedField {
            value: FieldValue::Single(OutputValue::Text(s.into())),
            reasoning: None,
        };
        let mut results = RowResults::new();
        let mut first = ParsedValues::new();
        first.insert("A".into(), field("a"));
        let mut second = ParsedValues::new();
        second.insert("B".into(), field("b"));
        results.insert(0, first);
        results.insert(0, second);

        assert_eq!(results.row_count(), 1);
        assert!(results.get(0, "A").is_some());
        assert!(results.get(0, "B").is_some());
        assert!(results.get(1, "A").is_none());
    }

    /// Rejects every call; prompts for the first output fail later.
    struct SlowFirstGateway;

    #[async_trait::async_trait]
    impl Gateway for SlowFirstGateway {
        async fn call(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
            if request.prompt.starts_with("Summarize") {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            Err(GatewayError::Auth(format!("rejected: {}", request.prompt)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_follow_output_order_within_row() {
        let (headers, rows) = dataset();
        let config = config().with_preview(2).with_combine_outputs(false);
        let orchestrator = Orchestrator::new(
            Arc::new(SlowFirstGateway),
            Arc::new(crate::budget::FlatRateEstimator::new(0.0)),
            EngineSettings::default(),
        );

        let output = orchestrator
            .run(&config, &headers, &rows, &CancellationToken::new())
            .await;

        let order: Vec<(Option<usize>, Option<&str>)> = output
            .errors
            .iter()
            .map(|e| (e.row_index, e.output_name.as_deref()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some(0), Some("Summary")),
                (Some(0), Some("Site")),
                (Some(1), Some("Summary")),
                (Some(1), Some("Site")),
            ]
        );
    }
}
