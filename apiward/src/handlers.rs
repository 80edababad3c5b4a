use anyhow::{Context, Result};
use apiward_core::{
    AssessConfig, CoreError, Database, DiscoveryOptions, Orchestrator, ProbeErrorPolicy,
    ProbeExecutor, TestPlan, discover,
};
use apiward_scanner::{CrawlConfig, ObserverConfig, ResolveOptions};
use clap::ArgMatches;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use url::Url;

pub const DEFAULT_DB_PATH: &str = "~/.config/apiward/apiward.db";

/// Expand a leading `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(path).into_owned());
    PathBuf::from(expanded)
}

/// Open an existing database. A missing file is the caller's problem, not ours.
pub fn open_database(path: &Path) -> Result<Database> {
    if !Database::exists(path) {
        return Err(CoreError::InvalidInput(format!(
            "No database at {}; run `apiward init` first",
            path.display()
        ))
        .into());
    }
    Ok(Database::new(path)?)
}

/// Read a YAML payload from disk and make sure it decodes before it is stored.
pub fn load_payload(path: &Path) -> Result<String> {
    let payload = fs::read_to_string(path).map_err(|e| {
        CoreError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
    })?;

    TestPlan::parse(&payload).map_err(|e| {
        CoreError::InvalidInput(format!("{} is not a valid test payload: {}", path.display(), e))
    })?;

    Ok(payload)
}

/// Validate a URL argument and return it unchanged.
pub fn parse_target_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| CoreError::InvalidInput(format!("Invalid URL '{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::InvalidInput(format!(
            "URL must start with http:// or https://: {}",
            raw
        ))
        .into());
    }
    Ok(raw.to_string())
}

/// Map the `discover` flags onto crawl, browser and resolver configuration.
pub fn discovery_options(args: &ArgMatches, show_progress: bool) -> DiscoveryOptions {
    let mut crawl = CrawlConfig::default()
        .with_delay(Duration::from_millis(*args.get_one::<u64>("delay-ms").unwrap_or(&1000)))
        .with_timeout(Duration::from_secs(*args.get_one::<u64>("timeout").unwrap_or(&10)));
    if let Some(max_pages) = args.get_one::<usize>("max-pages") {
        crawl = crawl.with_max_pages(*max_pages);
    }
    if let Some(max_duration) = args.get_one::<u64>("max-duration") {
        crawl = crawl.with_max_duration(Duration::from_secs(*max_duration));
    }

    let mut observer = ObserverConfig::default().with_render_timeout(Duration::from_secs(
        *args.get_one::<u64>("render-timeout").unwrap_or(&30),
    ));
    if let Some(chrome) = args.get_one::<PathBuf>("chrome") {
        observer = observer.with_executable(chrome.clone());
    }

    DiscoveryOptions {
        crawl,
        observer,
        resolve: ResolveOptions {
            drop_first_sorted: !args.get_flag("keep-first"),
        },
        show_progress,
    }
}

/// Exit status for a failed command: 2 for bad input, 1 for everything else.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CoreError>() {
        Some(e) if e.is_client_error() => 2,
        _ => 1,
    }
}

/// The line shown to the user for a failed command. Only input errors are
/// echoed; anything else is logged and summarised.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<CoreError>() {
        Some(e) if e.is_client_error() => e.to_string(),
        _ => {
            error!("{:#}", err);
            "internal error, see the log for details".to_string()
        }
    }
}

fn required_id(args: &ArgMatches, name: &str) -> Result<i64> {
    args.get_one::<i64>(name)
        .copied()
        .with_context(|| format!("missing argument {}", name))
}

fn required_str<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing argument {}", name))
}

fn probe_executor(args: &ArgMatches) -> Result<ProbeExecutor> {
    let timeout = Duration::from_secs(*args.get_one::<u64>("timeout").unwrap_or(&10));
    ProbeExecutor::with_timeout(timeout).context("Failed to create HTTP client")
}

pub fn handle_init(args: &ArgMatches, db_path: &Path) -> Result<Value> {
    let db_path = args
        .get_one::<String>("PATH")
        .map(|p| expand_path(p))
        .unwrap_or_else(|| db_path.to_path_buf());
    let force = args.get_flag("force");

    if Database::exists(&db_path) {
        if !force {
            return Err(CoreError::InvalidInput(format!(
                "A database already exists at {}; pass --force to replace it",
                db_path.display()
            ))
            .into());
        }
        info!("Removing existing database at {}", db_path.display());
        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    Database::new(&db_path)?;
    info!("Database initialized at {}", db_path.display());

    Ok(json!({ "database": db_path.display().to_string() }))
}

pub async fn handle_discover(db: &Database, args: &ArgMatches, show_progress: bool) -> Result<Value> {
    let url = parse_target_url(required_str(args, "url")?)?;
    let name = required_str(args, "name")?;
    let options = discovery_options(args, show_progress);

    let outcome = discover(&url, &options).await?;
    let collection = db.create_collection(name, &outcome.api_endpoints)?;
    info!(
        "Collection {} '{}' stored with {} endpoints",
        collection.id,
        collection.name,
        collection.api_endpoints.len()
    );

    Ok(json!({
        "collection_id": collection.id,
        "name": collection.name,
        "crawled_pages": outcome.crawled_pages,
        "api_endpoints": outcome.api_endpoints,
    }))
}

pub fn handle_collection_list(db: &Database) -> Result<Value> {
    Ok(serde_json::to_value(db.list_collections()?)?)
}

pub fn handle_collection_show(db: &Database, args: &ArgMatches) -> Result<Value> {
    let id = required_id(args, "ID")?;
    let collection = db
        .get_collection(id)?
        .ok_or_else(|| CoreError::not_found("collection", id))?;
    Ok(serde_json::to_value(collection)?)
}

pub fn handle_collection_delete(db: &Database, args: &ArgMatches) -> Result<Value> {
    let id = required_id(args, "ID")?;
    if !db.delete_collection(id)? {
        return Err(CoreError::not_found("collection", id).into());
    }
    Ok(json!({ "deleted": id }))
}

pub fn handle_spec_add(db: &Database, args: &ArgMatches) -> Result<Value> {
    let name = required_str(args, "name")?;
    let file = expand_path(required_str(args, "file")?);
    let description = args.get_one::<String>("description").map(String::as_str);

    let payload = load_payload(&file)?;
    let spec = db.create_test_specification(name, description, &payload)?;
    info!("Stored test specification {} '{}'", spec.id, spec.name);

    Ok(serde_json::to_value(spec)?)
}

pub fn handle_spec_list(db: &Database) -> Result<Value> {
    Ok(serde_json::to_value(db.list_test_specifications()?)?)
}

pub fn handle_spec_show(db: &Database, args: &ArgMatches) -> Result<Value> {
    let id = required_id(args, "ID")?;
    let spec = db
        .get_test_specification(id)?
        .ok_or_else(|| CoreError::not_found("test specification", id))?;
    Ok(serde_json::to_value(spec)?)
}

pub async fn handle_assess_run(db: &Database, args: &ArgMatches) -> Result<Value> {
    let collection_id = required_id(args, "collection")?;
    let policy = if args.get_flag("continue-on-error") {
        ProbeErrorPolicy::TreatAsNoMatch
    } else {
        ProbeErrorPolicy::AbortRun
    };

    let orchestrator = Orchestrator::new(db, probe_executor(args)?)
        .with_config(AssessConfig::default().with_error_policy(policy));

    match args.get_one::<i64>("spec") {
        Some(spec_id) => Ok(serde_json::to_value(
            orchestrator.run_one(collection_id, *spec_id).await?,
        )?),
        None => Ok(serde_json::to_value(
            orchestrator.run_all(collection_id).await?,
        )?),
    }
}

pub fn handle_assess_list(db: &Database, args: &ArgMatches) -> Result<Value> {
    let collection_id = required_id(args, "collection")?;
    if db.get_collection(collection_id)?.is_none() {
        return Err(CoreError::not_found("collection", collection_id).into());
    }
    Ok(serde_json::to_value(db.list_assessments(collection_id)?)?)
}

pub fn handle_assess_show(db: &Database, args: &ArgMatches) -> Result<Value> {
    let id = required_id(args, "ID")?;
    let assessment = db
        .get_assessment(id)?
        .ok_or_else(|| CoreError::not_found("assessment", id))?;
    Ok(serde_json::to_value(assessment)?)
}

pub async fn handle_probe(db: &Database, args: &ArgMatches) -> Result<Value> {
    let url = parse_target_url(required_str(args, "url")?)?;
    let spec_id = required_id(args, "spec")?;

    let outcome = Orchestrator::new(db, probe_executor(args)?)
        .probe_url(&url, spec_id)
        .await?;
    Ok(serde_json::to_value(outcome)?)
}

/// Run every subcommand that works on an existing database.
pub async fn dispatch(
    db: &Database,
    command: &str,
    args: &ArgMatches,
    show_progress: bool,
) -> Result<Value> {
    match (command, args.subcommand()) {
        ("discover", _) => handle_discover(db, args, show_progress).await,
        ("collection", Some(("list", _))) => handle_collection_list(db),
        ("collection", Some(("show", sub))) => handle_collection_show(db, sub),
        ("collection", Some(("delete", sub))) => handle_collection_delete(db, sub),
        ("spec", Some(("add", sub))) => handle_spec_add(db, sub),
        ("spec", Some(("list", _))) => handle_spec_list(db),
        ("spec", Some(("show", sub))) => handle_spec_show(db, sub),
        ("assess", Some(("run", sub))) => handle_assess_run(db, sub).await,
        ("assess", Some(("list", sub))) => handle_assess_list(db, sub),
        ("assess", Some(("show", sub))) => handle_assess_show(db, sub),
        ("probe", _) => handle_probe(db, args).await,
        _ => anyhow::bail!("unknown command {}", command),
    }
}
