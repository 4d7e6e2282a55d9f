//! End-to-end tests: envelopes in through the background worker, results
//! folded into a caller-side store.

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::*;
use serde_json::json;

use patient_worker::config::{UpdateMissPolicy, WorkerConfig};
use patient_worker::execution::{BackgroundWorker, Dispatcher, HandlerRegistry, WorkerHandle};
use patient_worker::handlers::shared_dataset;
use patient_worker::messaging::{InboundEnvelope, ResultMessage};
use patient_worker::models::{DataQuery, Datum, Endpoints};
use patient_worker::store::{MergeOutcome, ResultMerger};

fn at(day: u32, hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn glucose(id: &str, day: u32, hour: u32) -> Datum {
    datum(id, "cbg").with_time(at(day, hour)).with_device("dexcom-g6")
}

async fn collect(handle: &mut WorkerHandle, count: usize) -> Vec<ResultMessage> {
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        results.push(handle.recv().await.expect("worker stopped early"));
    }
    results
}

#[tokio::test]
async fn test_add_then_query_merges_into_store() {
    let config = WorkerConfig::default();
    let (mut handle, dataset) = BackgroundWorker::spawn_default(&config);
    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("patient-1");

    let records = vec![
        glucose("a", 1, 8),
        glucose("b", 2, 8),
        datum("c", "smbg").with_time(at(2, 9)),
    ];
    handle
        .send(add_data_envelope("patient-1", "add-1", &records))
        .await
        .unwrap();
    handle
        .send(query_envelope(
            "patient-1",
            "query-1",
            &DataQuery::for_types(["cbg"]),
        ))
        .await
        .unwrap();

    let results = collect(&mut handle, 2).await;
    assert_eq!(results[0].request_id(), "add-1");
    assert_eq!(results[1].request_id(), "query-1");
    assert!(results.iter().all(|r| r.success));

    assert_eq!(
        merger.merge_result(&results[0]).unwrap(),
        MergeOutcome::Applied("add_data_success")
    );
    assert_eq!(merger.store().size(), 3);
    assert_eq!(merger.store().patient_id(), Some("patient-1"));
    assert!(merger.store().cache_until.is_some());

    assert_eq!(
        merger.merge_result(&results[1]).unwrap(),
        MergeOutcome::Applied("query_data_success")
    );
    let ids: Vec<&str> = merger
        .store()
        .data
        .combined
        .iter()
        .map(|d| d.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(merger.store().data.current.record_count(), 2);
    assert_eq!(dataset.read().size(), 3);

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.stats.succeeded, 2);
}

#[tokio::test]
async fn test_windowed_query_returns_neighbours() {
    let config = WorkerConfig::default();
    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);

    let records = vec![
        glucose("before", 1, 12),
        glucose("inside", 2, 12),
        glucose("after", 3, 12),
    ];
    handle
        .send(add_data_envelope("p", "add", &records))
        .await
        .unwrap();
    let query = DataQuery::for_types(["cbg"]).with_endpoints(Endpoints::new(at(2, 0), at(3, 0)));
    handle.send(query_envelope("p", "query", &query)).await.unwrap();

    let results = collect(&mut handle, 2).await;
    let windows = results[1]
        .result
        .as_ref()
        .and_then(|r| r.data.as_ref())
        .and_then(|d| d.windows())
        .cloned()
        .expect("query result carries windows");

    let names = |w: &patient_worker::models::DataWindow| -> Vec<String> {
        w.datums().map(|d| d.id.clone()).collect()
    };
    assert_eq!(names(&windows.prev), vec!["before"]);
    assert_eq!(names(&windows.current), vec!["inside"]);
    assert_eq!(names(&windows.next), vec!["after"]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_report_summarises_loaded_records() {
    let config = WorkerConfig::default();
    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);

    let records = vec![
        glucose("g1", 1, 8),
        glucose("g2", 1, 20),
        datum("s1", "smbg").with_time(at(1, 9)).with_device("contour"),
    ];
    handle
        .send(add_data_envelope("p", "add", &records))
        .await
        .unwrap();
    handle
        .send(report_envelope("p", "report", &["cbg", "smbg"]))
        .await
        .unwrap();

    let results = collect(&mut handle, 2).await;
    let report = results[1]
        .result
        .as_ref()
        .and_then(|r| r.report.clone())
        .expect("report result carries an artifact");

    assert_eq!(report.total_records(), 3);
    let cbg = report.section("cbg").unwrap();
    assert_eq!(cbg.record_count, 2);
    assert_eq!(cbg.devices, vec!["dexcom-g6"]);
    assert_eq!(cbg.first_time, Some(at(1, 8)));
    assert_eq!(cbg.last_time, Some(at(1, 20)));
    assert_eq!(report.section("smbg").unwrap().record_count, 1);

    // Reports never touch the caller's store
    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("p");
    assert_eq!(merger.merge_result(&results[1]).unwrap(), MergeOutcome::Skipped);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_report_without_types_fails() {
    let config = WorkerConfig::default();
    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);

    handle
        .send(report_envelope("p", "empty-report", &[]))
        .await
        .unwrap();

    let result = handle.recv().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some("ReportGenerationError"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_tag_is_rejected_without_queueing() {
    let config = WorkerConfig::default();
    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);

    handle
        .send(InboundEnvelope::new("p", "spreadsheet", json!({})).with_request_id("odd"))
        .await
        .unwrap();
    handle
        .send(query_envelope("p", "stats", &DataQuery::stats_only()))
        .await
        .unwrap();

    let results = collect(&mut handle, 2).await;
    assert_eq!(results[0].request_id(), "odd");
    assert_eq!(results[0].error_kind(), Some("UnknownHandlerKindError"));
    assert!(results[1].success);

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.stats.rejected, 1);
    assert_eq!(summary.stats.processed, 1);
}

#[tokio::test]
async fn test_update_miss_reports_not_found_and_store_is_untouched() {
    let config = WorkerConfig::default();
    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);
    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("p");

    handle
        .send(add_data_envelope("p", "add", &[glucose("known", 1, 1)]))
        .await
        .unwrap();
    handle
        .send(
            InboundEnvelope::new(
                "p",
                "data",
                json!({ "method": "updateDatum", "datum": datum("ghost", "cbg") }),
            )
            .with_request_id("update"),
        )
        .await
        .unwrap();

    let results = collect(&mut handle, 2).await;
    merger.merge_result(&results[0]).unwrap();
    let before = merger.store().clone();

    assert_eq!(results[1].error_kind(), Some("NotFoundError"));
    assert_eq!(merger.merge_result(&results[1]).unwrap(), MergeOutcome::Skipped);
    assert_eq!(merger.store(), &before);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_miss_ignored_when_configured() {
    let config = WorkerConfig {
        update_miss: UpdateMissPolicy::Ignore,
        ..WorkerConfig::default()
    };
    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);

    handle
        .send(
            InboundEnvelope::new(
                "p",
                "data",
                json!({ "method": "updateDatum", "datum": datum("ghost", "cbg") }),
            )
            .with_request_id("update"),
        )
        .await
        .unwrap();

    let result = handle.recv().await.unwrap();
    assert!(result.success);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_query_resets_store() {
    let config = WorkerConfig::default();
    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);
    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("p");

    handle
        .send(add_data_envelope("p", "add", &[glucose("a", 1, 1)]))
        .await
        .unwrap();
    let inverted = DataQuery::for_types(["cbg"]).with_endpoints(Endpoints::new(at(3, 0), at(1, 0)));
    handle
        .send(query_envelope("p", "bad-query", &inverted))
        .await
        .unwrap();

    let results = collect(&mut handle, 2).await;
    merger.merge_result(&results[0]).unwrap();
    assert_eq!(merger.store().size(), 1);

    assert_eq!(results[1].error_kind(), Some("DataProcessingError"));
    assert_eq!(
        merger.merge_result(&results[1]).unwrap(),
        MergeOutcome::Applied("fetch_patient_data_failure")
    );
    assert!(merger.store().data.combined.is_empty());
    assert_eq!(merger.store().patient_id(), None);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_patient_switch_discards_pending_and_drops_stale_results() {
    let config = WorkerConfig::default();
    let registry = HandlerRegistry::with_default_handlers(shared_dataset(), &config);
    let mut dispatcher = Dispatcher::new(Arc::new(registry), &config);

    // Queued back to back before anything runs, so the switch is deterministic
    for (id, records) in [("a-1", vec![glucose("a1", 1, 1)]), ("a-2", vec![glucose("a2", 1, 2)])] {
        assert!(dispatcher
            .accept(add_data_envelope("patient-a", id, &records))
            .is_none());
    }
    assert!(dispatcher
        .accept(add_data_envelope("patient-b", "b-1", &[glucose("b1", 1, 3)]))
        .is_none());

    let results = dispatcher.run_until_idle().await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.request_id()).collect();
    assert_eq!(ids, vec!["b-1"]);
    assert_eq!(dispatcher.stats().discarded, 2);

    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("patient-b");
    let late = add_success("patient-a", vec![glucose("late", 1, 4)]);
    assert_eq!(merger.merge_result(&late).unwrap(), MergeOutcome::Stale);
    assert_eq!(
        merger.merge_result(&results[0]).unwrap(),
        MergeOutcome::Applied("add_data_success")
    );
    assert_eq!(merger.store().size(), 1);
    assert_eq!(merger.store().patient_id(), Some("patient-b"));
}

#[tokio::test]
async fn test_remove_with_preserve_cache_keeps_patient() {
    let config = WorkerConfig::default();
    let (mut handle, dataset) = BackgroundWorker::spawn_default(&config);
    let mut merger = ResultMerger::new(&config);
    merger.set_active_context("p");

    handle
        .send(add_data_envelope("p", "add", &[glucose("a", 1, 1)]))
        .await
        .unwrap();
    handle
        .send(
            InboundEnvelope::new("p", "data", json!({ "method": "removeData", "preserveCache": true }))
                .with_request_id("remove"),
        )
        .await
        .unwrap();

    for result in collect(&mut handle, 2).await {
        merger.merge_result(&result).unwrap();
    }

    assert!(merger.store().data.combined.is_empty());
    assert_eq!(merger.store().size(), 0);
    assert_eq!(merger.store().patient_id(), Some("p"));
    assert!(merger.store().cache_until.is_some());
    assert!(dataset.read().is_empty());
    assert_eq!(dataset.read().patient_id(), Some("p"));

    handle.shutdown().await.unwrap();
}
