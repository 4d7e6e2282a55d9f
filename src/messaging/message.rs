//! # Work and Result Messages
//!
//! Typed messages exchanged between the caller and the background worker.
//! Inbound work is only ever constructed from a parsed envelope or by Rust
//! callers directly, so the handler kind is always one of the closed set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ErrorDescriptor, WorkerError};
use crate::models::{DataQuery, DataWindow, Datum, MetaData, ReportArtifact};

/// Identifier scoping a batch of work (typically the patient id)
///
/// `None` is a legitimate value meaning "no active context".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Option<String>);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "<none>"),
        }
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContextId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<Option<String>> for ContextId {
    fn from(id: Option<String>) -> Self {
        Self(id)
    }
}

/// Category of work a message requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Data aggregation (add/remove/update/query)
    Data,
    /// Report generation
    #[serde(alias = "pdf")]
    Report,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 2] = [HandlerKind::Data, HandlerKind::Report];
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Report => write!(f, "report"),
        }
    }
}

impl FromStr for HandlerKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Self::Data),
            "report" | "pdf" => Ok(Self::Report),
            other => Err(WorkerError::unknown_handler_kind(other)),
        }
    }
}

/// A unit of queued work. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
    request_id: String,
    context: ContextId,
    kind: HandlerKind,
    payload: Value,
    received_at: DateTime<Utc>,
}

impl WorkMessage {
    /// Create a new message with a generated request id
    pub fn new(context: impl Into<ContextId>, kind: HandlerKind, payload: Value) -> Self {
        Self::with_request_id(Uuid::new_v4().to_string(), context, kind, payload)
    }

    pub fn with_request_id(
        request_id: impl Into<String>,
        context: impl Into<ContextId>,
        kind: HandlerKind,
        payload: Value,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            context: context.into(),
            kind,
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// The data operation name when the payload carries one
    pub fn method(&self) -> Option<&str> {
        self.payload.get("method").and_then(Value::as_str)
    }

    /// Metadata for the result message answering this one
    pub fn result_meta(&self) -> ResultMeta {
        ResultMeta {
            request_id: self.request_id.clone(),
            context: self.context.clone(),
            handler_kind: Some(self.kind),
            method: self.method().map(String::from),
        }
    }
}

/// Correlation data echoed on every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    pub request_id: String,
    pub context: ContextId,

    /// Absent when the inbound tag could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_kind: Option<HandlerKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Outbound message delivered on the caller's channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    pub meta: ResultMeta,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkerResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl ResultMessage {
    pub fn success(meta: ResultMeta, result: WorkerResult) -> Self {
        Self {
            meta,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(meta: ResultMeta, error: &WorkerError) -> Self {
        Self {
            meta,
            success: false,
            result: None,
            error: Some(error.to_descriptor()),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.meta.request_id
    }

    pub fn context(&self) -> &ContextId {
        &self.meta.context
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}

/// Payload of a successful result; fields an operation does not produce are omitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<MetaData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<DataQuery>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_prefs: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_prefs: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<Datum>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportArtifact>,

    /// Set by remove operations so the store can reset the same way
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_cache: Option<bool>,
}

/// `data` field of a result: appended records or windowed views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultData {
    Records(Vec<Datum>),
    Windows(WindowedData),
}

impl ResultData {
    pub fn records(&self) -> Option<&[Datum]> {
        match self {
            Self::Records(records) => Some(records),
            Self::Windows(_) => None,
        }
    }

    pub fn windows(&self) -> Option<&WindowedData> {
        match self {
            Self::Windows(windows) => Some(windows),
            Self::Records(_) => None,
        }
    }
}

/// Previous/current/next partitions returned by a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowedData {
    #[serde(default)]
    pub current: DataWindow,
    #[serde(default)]
    pub next: DataWindow,
    #[serde(default)]
    pub prev: DataWindow,

    /// The worker's combined collection after the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined: Option<Vec<Datum>>,
}
