pub mod assess;
pub mod data;
pub mod discover;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod probe;
pub mod spec;

pub use assess::{
    AssessConfig, AssessmentOutcome, EndpointVerdicts, Orchestrator, ProbeErrorPolicy,
    ProbeOutcome, ResultStore, RunOneOutcome, TestCaseResult,
};
pub use data::Database;
pub use discover::{
    DiscoveryOptions, DiscoveryOutcome, discover, discover_with_observer, validate_domain,
};
pub use error::{CoreError, ProbeError, Result, SpecificationError};
pub use evaluate::{ProbeResponse, evaluate};
pub use model::{Assessment, Collection, SecurityResult, Verdicts};
pub use probe::{ProbeExecutor, build_probe_url, build_probe_urls};
pub use spec::{BodyAssertions, CodeRange, LengthBounds, TestCategory, TestPlan, TestSpecification};
