//! # Inbound Envelope
//!
//! The untyped wire form of a request. This is the only place where the
//! handler kind exists as a string; everything past [`InboundEnvelope::into_work_message`]
//! works with the closed [`HandlerKind`] set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::message::{ContextId, HandlerKind, ResultMeta, WorkMessage};
use crate::error::{Result, WorkerError};

/// `{ meta: { context, handlerKind, requestId, ... }, payload }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub meta: EnvelopeMeta,

    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    #[serde(default, alias = "patientId")]
    pub context: ContextId,

    /// Raw tag; anything but a known string is rejected with a failure result
    #[serde(default, alias = "worker", skip_serializing_if = "Value::is_null")]
    pub handler_kind: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Caller metadata the worker does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundEnvelope {
    pub fn new(
        context: impl Into<ContextId>,
        handler_kind: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            meta: EnvelopeMeta {
                context: context.into(),
                handler_kind: Value::String(handler_kind.into()),
                request_id: None,
                extra: Map::new(),
            },
            payload,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.meta.request_id = Some(request_id.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn context(&self) -> &ContextId {
        &self.meta.context
    }

    /// Assign a request id if the caller did not provide one
    pub fn ensure_request_id(&mut self) -> &str {
        self.meta
            .request_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
    }

    /// Parse the handler tag and build a typed message
    pub fn into_work_message(mut self) -> Result<WorkMessage> {
        let kind: HandlerKind = match &self.meta.handler_kind {
            Value::String(tag) => tag.parse()?,
            Value::Null => return Err(WorkerError::unknown_handler_kind("<missing>")),
            other => return Err(WorkerError::unknown_handler_kind(other.to_string())),
        };
        let request_id = self.ensure_request_id().to_string();
        Ok(WorkMessage::with_request_id(
            request_id,
            self.meta.context,
            kind,
            self.payload,
        ))
    }

    /// Result metadata for a rejection at the boundary
    pub fn rejection_meta(&mut self) -> ResultMeta {
        let method = self
            .payload
            .get("method")
            .and_then(Value::as_str)
            .map(String::from);
        ResultMeta {
            request_id: self.ensure_request_id().to_string(),
            context: self.meta.context.clone(),
            handler_kind: None,
            method,
        }
    }
}

impl TryFrom<InboundEnvelope> for WorkMessage {
    type Error = WorkerError;

    fn try_from(envelope: InboundEnvelope) -> Result<Self> {
        envelope.into_work_message()
    }
}
