//! Scenario execution logic

use crate::assertion::DefaultAssertionController;
use crate::config::RunConfig;
use crate::context::VariableStore;
use crate::model::{ResultScenario, Scenario};
use crate::step::{DefaultStepRunner, StepRunner};
use crate::transport::ReqwestTransport;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Scenario runner trait
#[async_trait]
pub trait ScenarioRunner: Send + Sync {
    /// Execute a scenario with a fresh variable store
    async fn run(&self, scenario: &Scenario) -> ResultScenario;
}

/// Default scenario runner
pub struct DefaultScenarioRunner {
    steps: Arc<dyn StepRunner>,
    variables: BTreeMap<String, String>,
}

impl DefaultScenarioRunner {
    /// Create a runner executing steps through `steps`
    pub fn new(steps: Arc<dyn StepRunner>) -> Self {
        Self {
            steps,
            variables: BTreeMap::new(),
        }
    }

    /// Create a runner sending real HTTP requests as configured
    pub fn from_config(config: &RunConfig) -> Self {
        let mut transport = ReqwestTransport::new();
        if let Some(timeout) = config.timeout {
            transport = transport.with_timeout(Duration::from_secs(timeout));
        }
        let steps = DefaultStepRunner::new(
            Arc::new(transport),
            Arc::new(DefaultAssertionController),
        )
        .with_override_headers(config.headers.clone());

        Self::new(Arc::new(steps)).with_variables(config.variables.clone())
    }

    /// Variables every run starts with
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }
}

#[async_trait]
impl ScenarioRunner for DefaultScenarioRunner {
    #[instrument(skip(self, scenario), fields(name = %scenario.name))]
    async fn run(&self, scenario: &Scenario) -> ResultScenario {
        let start_time = Instant::now();
        let mut store = VariableStore::from(self.variables.clone());
        let mut step_results = Vec::new();
        let mut error_message = None;

        info!("Starting scenario: {}", scenario.name);
        for (name, value) in store.iter() {
            debug!("Initial variable {} = {}", name, value);
        }

        for (step_idx, step) in scenario.steps.iter().enumerate() {
            info!(
                "Running step {}/{}: {}",
                step_idx + 1,
                scenario.steps.len(),
                step.step_type
            );

            match self.steps.run(step, &mut store).await {
                Ok(result) => step_results.push(result),
                Err(failure) => {
                    error!("Stopping scenario at step {}: {}", step_idx + 1, failure);
                    error_message =
                        Some(format!("step {}: {}", step_idx + 1, failure));
                    step_results.push(*failure.partial);
                    break;
                }
            }
        }

        let success = error_message.is_none()
            && step_results.iter().all(|step| step.is_success());

        let result = ResultScenario {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            success,
            error: error_message,
            steps: step_results,
            duration: start_time.elapsed(),
        };

        info!(
            "Scenario finished: {} ({} ms) - Success: {}",
            scenario.name,
            result.duration.as_millis(),
            result.success
        );

        result
    }
}
