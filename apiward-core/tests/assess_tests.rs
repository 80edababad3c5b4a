// Tests for assessment orchestration

use apiward_core::{
    AssessConfig, CoreError, Database, Orchestrator, ProbeErrorPolicy, ProbeExecutor,
};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, path_regex},
};

const SQLI_PAYLOAD: &str = r#"
wordLists:
  filePaths: ["' OR 1=1 --"]
validate:
  response_code:
    gte: 500
  response_payload:
    contains_either: ["SQL syntax", "sqlite3.OperationalError"]
"#;

const BOLA_PAYLOAD: &str = r#"
validate:
  response_code:
    gte: 200
    lt: 300
  response_payload:
    contains_all: ["email"]
"#;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

fn executor() -> ProbeExecutor {
    ProbeExecutor::with_timeout(Duration::from_secs(5)).unwrap()
}

/// `/api/users/1` leaks another user's record; injection attempts get a clean 400.
async fn mount_leaky_api(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/users/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"id":1,"email":"alice@example.com"}"#),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/users/1/.+"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(server)
        .await;
}

// ============================================================================
// run_all Tests
// ============================================================================

#[tokio::test]
async fn test_run_all_folds_verdicts_per_category() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let endpoint = format!("{}/api/users/1", mock_server.uri());
    let collection = db.create_collection("shop", &[endpoint.clone()]).unwrap();
    db.create_test_specification("SQL Injection", None, SQLI_PAYLOAD)
        .unwrap();
    db.create_test_specification("BOLA", Some("object level access"), BOLA_PAYLOAD)
        .unwrap();

    let orchestrator = Orchestrator::new(&db, executor());
    let outcome = orchestrator.run_all(collection.id).await.unwrap();

    assert_eq!(outcome.collection_id, collection.id);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].endpoint, endpoint);
    assert_eq!(outcome.results[0].verdicts.get("sqli"), Some(&false));
    assert_eq!(outcome.results[0].verdicts.get("bola"), Some(&true));

    let stored = db.get_assessment(outcome.assessment_id).unwrap().unwrap();
    assert_eq!(stored.collection_id, collection.id);
    assert_eq!(stored.timestamp, outcome.timestamp);
    assert_eq!(stored.results.len(), 1);
    assert_eq!(stored.results[0].endpoint, endpoint);
    assert_eq!(stored.results[0].verdicts, outcome.results[0].verdicts);
}

#[tokio::test]
async fn test_run_all_output_flattens_verdicts() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let endpoint = format!("{}/api/users/1", mock_server.uri());
    let collection = db.create_collection("shop", &[endpoint.clone()]).unwrap();
    db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();

    let outcome = Orchestrator::new(&db, executor())
        .run_all(collection.id)
        .await
        .unwrap();
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["results"][0]["endpoint"], endpoint.as_str());
    assert_eq!(json["results"][0]["bola"], true);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_custom_category_keeps_endpoint_in_output() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let endpoint = format!("{}/api/users/1", mock_server.uri());
    let collection = db.create_collection("shop", &[endpoint.clone()]).unwrap();
    assert!(matches!(
        db.create_test_specification("Endpoint", None, BOLA_PAYLOAD),
        Err(CoreError::InvalidInput(_))
    ));
    db.create_test_specification("Endpoint exposure", None, BOLA_PAYLOAD)
        .unwrap();

    let outcome = Orchestrator::new(&db, executor())
        .run_all(collection.id)
        .await
        .unwrap();
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["results"][0]["endpoint"], endpoint.as_str());
    assert_eq!(json["results"][0]["endpoint_exposure"], true);
}

#[tokio::test]
async fn test_category_verdict_is_never_reset() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let endpoint = format!("{}/api/users/1", mock_server.uri());
    let collection = db.create_collection("shop", &[endpoint]).unwrap();

    // the first BOLA spec matches, the second does not
    db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();
    db.create_test_specification(
        "BOLA admin listing",
        None,
        "validate:\n  response_payload:\n    contains_all: [is_admin]\n",
    )
    .unwrap();

    let outcome = Orchestrator::new(&db, executor())
        .run_all(collection.id)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].verdicts.len(), 1);
    assert_eq!(outcome.results[0].verdicts.get("bola"), Some(&true));
}

#[tokio::test]
async fn test_unparseable_specification_counts_as_no_match() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let endpoint = format!("{}/api/users/1", mock_server.uri());
    let collection = db.create_collection("shop", &[endpoint]).unwrap();
    db.create_test_specification("SQL Injection", None, "validate: [broken")
        .unwrap();
    db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();

    let outcome = Orchestrator::new(&db, executor())
        .run_all(collection.id)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].verdicts.get("sqli"), Some(&false));
    assert_eq!(outcome.results[0].verdicts.get("bola"), Some(&true));
}

#[tokio::test]
async fn test_run_all_unknown_collection_creates_nothing() {
    let (_temp_dir, db) = create_test_db();

    let result = Orchestrator::new(&db, executor()).run_all(42).await;

    assert!(matches!(result, Err(CoreError::NotFound { .. })));
    assert!(result.unwrap_err().is_client_error());
    assert!(db.list_assessments(42).unwrap().is_empty());
}

// ============================================================================
// Error Policy Tests
// ============================================================================

#[tokio::test]
async fn test_fetch_error_aborts_run_by_default() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let good = format!("{}/api/users/1", mock_server.uri());
    // nothing listens on port 9 of the loopback interface
    let dead = "http://127.0.0.1:9/api/users/2".to_string();
    let collection = db
        .create_collection("shop", &[good.clone(), dead.clone()])
        .unwrap();
    db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();

    let result = Orchestrator::new(&db, executor())
        .run_all(collection.id)
        .await;

    match result {
        Err(CoreError::Fetch { url, .. }) => assert_eq!(url, dead),
        other => panic!("expected fetch error, got {:?}", other),
    }

    // the assessment and the first endpoint's row survive the abort
    let assessments = db.list_assessments(collection.id).unwrap();
    assert_eq!(assessments.len(), 1);
    assert_eq!(assessments[0].results.len(), 1);
    assert_eq!(assessments[0].results[0].endpoint, good);
}

#[tokio::test]
async fn test_fetch_error_counts_as_no_match_when_configured() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let good = format!("{}/api/users/1", mock_server.uri());
    let dead = "http://127.0.0.1:9/api/users/2".to_string();
    let collection = db
        .create_collection("shop", &[good, dead.clone()])
        .unwrap();
    db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();

    let config = AssessConfig::default().with_error_policy(ProbeErrorPolicy::TreatAsNoMatch);
    let outcome = Orchestrator::new(&db, executor())
        .with_config(config)
        .run_all(collection.id)
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].verdicts.get("bola"), Some(&true));
    assert_eq!(outcome.results[1].endpoint, dead);
    assert_eq!(outcome.results[1].verdicts.get("bola"), Some(&false));
}

// ============================================================================
// run_one and probe_url Tests
// ============================================================================

#[tokio::test]
async fn test_run_one_reports_per_endpoint_without_assessment() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let (_temp_dir, db) = create_test_db();
    let leaky = format!("{}/api/users/1", mock_server.uri());
    let health = format!("{}/api/health", mock_server.uri());
    let collection = db
        .create_collection("shop", &[leaky.clone(), health.clone()])
        .unwrap();
    let spec = db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();

    let outcome = Orchestrator::new(&db, executor())
        .run_one(collection.id, spec.id)
        .await
        .unwrap();

    assert_eq!(outcome.test_spec_id, spec.id);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].endpoint, leaky);
    assert!(outcome.results[0].result);
    assert_eq!(outcome.results[0].test_case_id, spec.id);
    assert!(!outcome.results[1].result);

    assert!(db.list_assessments(collection.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_run_one_unknown_specification() {
    let (_temp_dir, db) = create_test_db();
    let collection = db.create_collection("empty", &[]).unwrap();

    let result = Orchestrator::new(&db, executor())
        .run_one(collection.id, 99)
        .await;

    assert!(matches!(result, Err(CoreError::NotFound { id: 99, .. })));
}

#[tokio::test]
async fn test_probe_url_runs_one_specification() {
    let mock_server = MockServer::start().await;
    mount_leaky_api(&mock_server).await;

    let (_temp_dir, db) = create_test_db();
    let spec = db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();
    let url = format!("{}/api/users/1", mock_server.uri());

    let outcome = Orchestrator::new(&db, executor())
        .probe_url(&url, spec.id)
        .await
        .unwrap();

    assert_eq!(outcome.url, url);
    assert!(outcome.result);
}

#[tokio::test]
async fn test_probe_url_rejects_non_http_url() {
    let (_temp_dir, db) = create_test_db();
    let spec = db.create_test_specification("BOLA", None, BOLA_PAYLOAD).unwrap();

    let result = Orchestrator::new(&db, executor())
        .probe_url("file:///etc/passwd", spec.id)
        .await;

    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}
