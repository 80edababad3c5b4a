use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category key -> whether any specification in that category matched.
pub type Verdicts = BTreeMap<String, bool>;

/// Endpoints found by one discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub api_endpoints: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One endpoint's folded verdicts within an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityResult {
    pub id: i64,
    pub assessment_id: i64,
    pub endpoint: String,
    pub verdicts: Verdicts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub collection_id: i64,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<SecurityResult>,
}
