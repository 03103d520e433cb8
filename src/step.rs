//! Step execution: pauses and HTTP requests.

use crate::assertion::AssertionController;
use crate::context::VariableStore;
use crate::error::{StepError, StepFailure};
use crate::extractor;
use crate::model::{
    Assertion, Response, ResultAssertion, ResultStep, ResultVariable, Step,
    StepType,
};
use crate::request::{self, RestRequest};
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Runs one step against the variables of the current scenario run.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(
        &self,
        step: &Step,
        store: &mut VariableStore,
    ) -> Result<ResultStep, StepFailure>;
}

/// Step runner backed by a transport and an assertion controller.
pub struct DefaultStepRunner {
    transport: Arc<dyn Transport>,
    assertions: Arc<dyn AssertionController>,
    override_headers: BTreeMap<String, String>,
}

impl DefaultStepRunner {
    pub fn new(
        transport: Arc<dyn Transport>,
        assertions: Arc<dyn AssertionController>,
    ) -> Self {
        Self {
            transport,
            assertions,
            override_headers: BTreeMap::new(),
        }
    }

    /// Headers added to every request, replacing step headers of the
    /// same name. Values may contain placeholders.
    pub fn with_override_headers(
        mut self,
        headers: BTreeMap<String, String>,
    ) -> Self {
        self.override_headers = headers;
        self
    }

    async fn pause(&self, seconds: u64) -> ResultStep {
        let start = Instant::now();
        info!("------------------------");
        info!("Waiting for {}s", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;

        let mut result = ResultStep::new(StepType::Pause);
        result.step_time = start.elapsed();
        result
    }

    async fn request(
        &self,
        step: &Step,
        store: &mut VariableStore,
    ) -> Result<ResultStep, StepFailure> {
        let mut result = ResultStep::new(StepType::Request);

        let (req, applied) =
            match request::build_request(step, &self.override_headers, store) {
                Ok(built) => built,
                Err(err) => {
                    error!("Cannot build request: {}", err);
                    return Err(StepFailure::new(result, err));
                }
            };
        log_request(&req, &applied);
        result.variables_applied = applied;

        let start = Instant::now();
        let sent = self.transport.send(&req).await;
        let elapsed = start.elapsed();
        result.request = Some(req);
        result.step_time = elapsed;

        let raw = match sent {
            Ok(raw) => raw,
            Err(err) => {
                error!("Failed to send request: {}", err);
                return Err(StepFailure::new(result, err));
            }
        };
        info!("Time elapsed: {:?}", elapsed);

        let response = Response::new(raw.status, raw.headers, raw.body, elapsed);

        result.assertions = self.assert_response(&response, &step.assertions);

        result.variables_created =
            extractor::extract_variables(&response, &step.variables, store);
        if !result.variables_created.is_empty() {
            info!("Variables created:");
            for variable in &result.variables_created {
                log_variable(variable);
            }
        }

        result.response = Some(response);
        Ok(result)
    }

    fn assert_response(
        &self,
        response: &Response,
        assertions: &[Assertion],
    ) -> Vec<ResultAssertion> {
        if !assertions.is_empty() {
            info!("Assertions:");
        }

        assertions
            .iter()
            .map(|assertion| {
                let outcome = self.assertions.assert(assertion, response);
                if outcome.success {
                    info!("\t✓ {}", outcome.message);
                } else {
                    error!("\t✗ {}", outcome.message);
                }
                outcome
            })
            .collect()
    }
}

#[async_trait]
impl StepRunner for DefaultStepRunner {
    #[instrument(skip_all, fields(step_type = %step.step_type))]
    async fn run(
        &self,
        step: &Step,
        store: &mut VariableStore,
    ) -> Result<ResultStep, StepFailure> {
        match &step.step_type {
            StepType::Pause => Ok(self.pause(step.duration).await),
            StepType::Request => self.request(step, store).await,
            StepType::Other(kind) => Err(StepFailure::new(
                ResultStep::new(step.step_type.clone()),
                StepError::InvalidStepKind(kind.clone()),
            )),
        }
    }
}

fn log_request(req: &RestRequest, applied: &[ResultVariable]) {
    info!("------------------------");
    info!("{}", req);
    if !req.body.is_empty() {
        debug!("Body: {}", String::from_utf8_lossy(&req.body));
    }
    if !req.headers.is_empty() {
        debug!("Headers:");
        for (key, value) in &req.headers {
            debug!("\t{}: {}", key, value);
        }
    }
    if !applied.is_empty() {
        info!("Variables used:");
        for variable in applied {
            log_variable(variable);
        }
    }
    info!("---");
}

fn log_variable(variable: &ResultVariable) {
    match &variable.value {
        Ok(_) => info!("\t{}", variable),
        Err(_) => error!("\t{}", variable),
    }
}
