//! Loaded configuration flowing into worker and merger behaviour.

mod common;

use std::collections::HashMap;
use std::io::Write;

use common::*;

use patient_worker::config::{ConfigLoader, StaleResultPolicy, UpdateMissPolicy, WorkerConfig};
use patient_worker::execution::BackgroundWorker;
use patient_worker::models::DataQuery;
use patient_worker::store::{MergeOutcome, ResultMerger};

fn config_file(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

fn load(file: &tempfile::NamedTempFile, env: &[(&str, &str)]) -> WorkerConfig {
    let vars = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
    ConfigLoader::new()
        .with_file(file.path())
        .with_env_overrides(vars)
        .load()
        .unwrap()
}

#[test]
fn test_merge_policy_from_file_keeps_stale_results() {
    let file = config_file(&["stale_results = \"merge\""]);
    let config = load(&file, &[]);
    assert_eq!(config.stale_results, StaleResultPolicy::Merge);

    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("current");
    let outcome = merger
        .merge_result(&add_success("previous", vec![datum("late", "cbg")]))
        .unwrap();

    assert_eq!(outcome, MergeOutcome::Applied("add_data_success"));
    assert_eq!(merger.store().size(), 1);
}

#[test]
fn test_cache_ttl_from_environment_sets_cache_horizon() {
    let file = config_file(&["cache_ttl_ms = 1000"]);
    let config = load(&file, &[("PATIENT_WORKER_CACHE_TTL_MS", "120000")]);
    assert_eq!(config.cache_ttl(), chrono::Duration::minutes(2));

    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("p");
    merger
        .dispatch(patient_worker::store::StoreAction::AddDataRequest {
            fetched_until: None,
            fetched_count: 1,
        })
        .unwrap();

    let remaining = merger.store().cache_until.unwrap() - chrono::Utc::now();
    assert!(remaining <= chrono::Duration::minutes(2));
    assert!(remaining > chrono::Duration::minutes(1));
}

#[test]
fn test_rejects_zero_capacity() {
    let file = config_file(&["inbound_capacity = 0"]);
    let err = ConfigLoader::new()
        .with_file(file.path())
        .with_env_overrides(HashMap::new())
        .load()
        .unwrap_err();
    assert_eq!(err.kind(), "ConfigurationError");
}

#[tokio::test]
async fn test_worker_honours_loaded_update_policy() {
    let file = config_file(&["update_miss = \"ignore\"", "inbound_capacity = 4"]);
    let config = load(&file, &[]);
    assert_eq!(config.update_miss, UpdateMissPolicy::Ignore);

    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);
    handle
        .send(
            patient_worker::messaging::InboundEnvelope::new(
                "p",
                "data",
                serde_json::json!({ "method": "updateDatum", "datum": datum("ghost", "cbg") }),
            )
            .with_request_id("update"),
        )
        .await
        .unwrap();
    handle
        .send(query_envelope("p", "stats", &DataQuery::stats_only()))
        .await
        .unwrap();

    let update = handle.recv().await.unwrap();
    let stats = handle.recv().await.unwrap();
    assert!(update.success);
    assert!(update.result.as_ref().unwrap().datum.is_none());
    assert!(stats.success);

    handle.shutdown().await.unwrap();
}
