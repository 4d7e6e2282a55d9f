//! Builders for envelopes and result messages used across integration tests.

use serde_json::{json, Value};

use patient_worker::messaging::{
    HandlerKind, InboundEnvelope, ResultData, ResultMessage, WorkMessage, WorkerResult,
};
use patient_worker::models::{DataQuery, Datum};

pub fn datum(id: &str, datum_type: &str) -> Datum {
    Datum::new(id, datum_type)
}

pub fn add_data_envelope(context: &str, request_id: &str, records: &[Datum]) -> InboundEnvelope {
    InboundEnvelope::new(
        context,
        "data",
        json!({ "method": "addData", "data": records, "patientId": context }),
    )
    .with_request_id(request_id)
}

pub fn query_envelope(context: &str, request_id: &str, query: &DataQuery) -> InboundEnvelope {
    InboundEnvelope::new(context, "data", json!({ "method": "queryData", "query": query }))
        .with_request_id(request_id)
}

pub fn report_envelope(context: &str, request_id: &str, report_types: &[&str]) -> InboundEnvelope {
    InboundEnvelope::new(context, "pdf", json!({ "reportTypes": report_types }))
        .with_request_id(request_id)
}

/// Successful data result as the worker would produce it
pub fn data_success(context: &str, method: &str, result: WorkerResult) -> ResultMessage {
    let message = WorkMessage::new(context, HandlerKind::Data, json!({ "method": method }));
    ResultMessage::success(message.result_meta(), result)
}

pub fn add_success(context: &str, records: Vec<Datum>) -> ResultMessage {
    data_success(
        context,
        "addData",
        WorkerResult {
            data: Some(ResultData::Records(records)),
            ..WorkerResult::default()
        },
    )
}

pub fn remove_success(context: &str, preserve_cache: bool) -> ResultMessage {
    data_success(
        context,
        "removeData",
        WorkerResult {
            preserve_cache: Some(preserve_cache),
            ..WorkerResult::default()
        },
    )
}

pub fn object(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
