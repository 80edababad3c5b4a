// Assessment orchestration: run stored test specifications over a collection

use crate::error::{CoreError, Result};
use crate::model::{Collection, Verdicts};
use crate::probe::ProbeExecutor;
use crate::spec::{TestPlan, TestSpecification};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// What to do when a probe request fails at the transport level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbeErrorPolicy {
    /// Stop the run and return the error. Rows already written stay.
    #[default]
    AbortRun,
    /// Log the failure and count that specification as not matching.
    TreatAsNoMatch,
}

#[derive(Debug, Clone, Default)]
pub struct AssessConfig {
    pub error_policy: ProbeErrorPolicy,
}

impl AssessConfig {
    pub fn with_error_policy(mut self, policy: ProbeErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// Where the orchestrator reads its inputs from and writes its results to.
pub trait ResultStore {
    fn collection(&self, id: i64) -> Result<Collection>;
    fn test_specifications(&self) -> Result<Vec<TestSpecification>>;
    fn test_specification(&self, id: i64) -> Result<TestSpecification>;
    fn create_assessment(&self, collection_id: i64, timestamp: DateTime<Utc>) -> Result<i64>;
    fn insert_security_result(
        &self,
        assessment_id: i64,
        endpoint: &str,
        verdicts: &Verdicts,
    ) -> Result<i64>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointVerdicts {
    pub endpoint: String,
    #[serde(flatten)]
    pub verdicts: Verdicts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentOutcome {
    pub collection_id: i64,
    pub assessment_id: i64,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<EndpointVerdicts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseResult {
    pub endpoint: String,
    pub test_case_id: i64,
    pub result: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOneOutcome {
    pub collection_id: i64,
    pub test_spec_id: i64,
    pub results: Vec<TestCaseResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub url: String,
    pub test_spec_id: i64,
    pub result: bool,
}

/// A specification paired with its decoded plan, or `None` when the payload
/// did not parse.
struct PreparedSpec {
    spec: TestSpecification,
    plan: Option<TestPlan>,
}

impl PreparedSpec {
    fn prepare(spec: TestSpecification) -> Self {
        let plan = match spec.plan() {
            Ok(plan) => Some(plan),
            Err(e) => {
                warn!(
                    "Test specification {} ({}) is unusable and will count as no match: {}",
                    spec.id, spec.name, e
                );
                None
            }
        };
        Self { spec, plan }
    }
}

pub struct Orchestrator<'a, S: ResultStore> {
    store: &'a S,
    executor: ProbeExecutor,
    config: AssessConfig,
}

impl<'a, S: ResultStore> Orchestrator<'a, S> {
    pub fn new(store: &'a S, executor: ProbeExecutor) -> Self {
        Self {
            store,
            executor,
            config: AssessConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AssessConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every stored specification against every endpoint of a collection.
    ///
    /// The assessment row is written before the first probe and each
    /// endpoint's verdicts are written as soon as they are complete, so an
    /// aborted run leaves a partial assessment behind.
    pub async fn run_all(&self, collection_id: i64) -> Result<AssessmentOutcome> {
        let collection = self.store.collection(collection_id)?;
        let specs: Vec<PreparedSpec> = self
            .store
            .test_specifications()?
            .into_iter()
            .map(PreparedSpec::prepare)
            .collect();

        let timestamp = Utc::now();
        let assessment_id = self.store.create_assessment(collection.id, timestamp)?;
        info!(
            "Assessment {} started: {} endpoints x {} specifications",
            assessment_id,
            collection.api_endpoints.len(),
            specs.len()
        );

        let blank: Verdicts = specs
            .iter()
            .map(|p| (p.spec.category.key().to_string(), false))
            .collect();

        let mut results = Vec::with_capacity(collection.api_endpoints.len());
        for endpoint in &collection.api_endpoints {
            let mut verdicts = blank.clone();

            for prepared in &specs {
                let matched = self.run_spec(endpoint, prepared).await?;
                if let Some(verdict) = verdicts.get_mut(prepared.spec.category.key()) {
                    *verdict |= matched;
                }
            }

            self.store
                .insert_security_result(assessment_id, endpoint, &verdicts)?;
            debug!("{}: {:?}", endpoint, verdicts);

            results.push(EndpointVerdicts {
                endpoint: endpoint.clone(),
                verdicts,
            });
        }

        info!("Assessment {} complete", assessment_id);

        Ok(AssessmentOutcome {
            collection_id: collection.id,
            assessment_id,
            timestamp,
            results,
        })
    }

    /// Run a single specification against every endpoint of a collection
    /// without recording an assessment.
    pub async fn run_one(&self, collection_id: i64, spec_id: i64) -> Result<RunOneOutcome> {
        let collection = self.store.collection(collection_id)?;
        let spec = self.store.test_specification(spec_id)?;
        let plan = spec.plan()?;

        let mut results = Vec::with_capacity(collection.api_endpoints.len());
        for endpoint in &collection.api_endpoints {
            let result = self.probe(endpoint, &spec, &plan).await?;
            results.push(TestCaseResult {
                endpoint: endpoint.clone(),
                test_case_id: spec.id,
                result,
            });
        }

        Ok(RunOneOutcome {
            collection_id: collection.id,
            test_spec_id: spec.id,
            results,
        })
    }

    /// Run one stored specification against an arbitrary URL.
    pub async fn probe_url(&self, url: &str, spec_id: i64) -> Result<ProbeOutcome> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::InvalidInput(format!(
                "URL must start with http:// or https://: {}",
                url
            )));
        }

        let spec = self.store.test_specification(spec_id)?;
        let plan = spec.plan()?;
        let result = self.probe(url, &spec, &plan).await?;

        Ok(ProbeOutcome {
            url: url.to_string(),
            test_spec_id: spec.id,
            result,
        })
    }

    async fn run_spec(&self, endpoint: &str, prepared: &PreparedSpec) -> Result<bool> {
        match &prepared.plan {
            Some(plan) => self.probe(endpoint, &prepared.spec, plan).await,
            None => Ok(false),
        }
    }

    async fn probe(&self, endpoint: &str, spec: &TestSpecification, plan: &TestPlan) -> Result<bool> {
        match self.executor.execute(endpoint, plan).await {
            Ok(matched) => Ok(matched),
            Err(e) => match self.config.error_policy {
                ProbeErrorPolicy::AbortRun => {
                    error!("Specification {} on {}: {}", spec.id, endpoint, e);
                    Err(CoreError::from(e))
                }
                ProbeErrorPolicy::TreatAsNoMatch => {
                    warn!(
                        "Specification {} on {} counted as no match: {}",
                        spec.id, endpoint, e
                    );
                    Ok(false)
                }
            },
        }
    }
}
