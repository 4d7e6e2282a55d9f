//! # Result Merger
//!
//! Folds worker result messages into the caller's [`CanonicalStore`].
//! Results carry the context they were produced for; with the default
//! [`StaleResultPolicy::Drop`] results for a superseded context are ignored.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::actions::StoreAction;
use super::canonical_store::{CanonicalStore, MergeRules};
use crate::config::{StaleResultPolicy, WorkerConfig};
use crate::constants::methods;
use crate::error::Result;
use crate::logging::log_merge_operation;
use crate::messaging::{ContextId, HandlerKind, ResultMessage, WorkerResult};
use crate::models::MetaData;

/// What happened to one result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The result was converted into this action and applied
    Applied(&'static str),
    /// The result belongs to a context that is no longer active
    Stale,
    /// Nothing in the store corresponds to this result
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ResultMerger {
    store: CanonicalStore,
    active_context: ContextId,
    stale_results: StaleResultPolicy,
    rules: MergeRules,
}

impl ResultMerger {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            store: CanonicalStore::new(),
            active_context: ContextId::none(),
            stale_results: config.stale_results,
            rules: MergeRules::from_config(config),
        }
    }

    pub fn with_store(mut self, store: CanonicalStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &CanonicalStore {
        &self.store
    }

    pub fn active_context(&self) -> &ContextId {
        &self.active_context
    }

    /// Mirror the context the caller is now sending work for
    pub fn set_active_context(&mut self, context: impl Into<ContextId>) {
        let context = context.into();
        if context != self.active_context {
            info!(from = %self.active_context, to = %context, "🧩 MERGE: active context changed");
            self.active_context = context;
        }
    }

    /// Apply a caller-originated action directly (requests, logout)
    pub fn dispatch(&mut self, action: StoreAction) -> Result<()> {
        let action_type = action.action_type();
        let context = self.active_context.to_string();
        match self.store.apply(action, &self.rules) {
            Ok(()) => {
                log_merge_operation(action_type, &context, "applied", None);
                Ok(())
            }
            Err(e) => {
                log_merge_operation(action_type, &context, "rejected", Some(&e.to_string()));
                Err(e)
            }
        }
    }

    /// Fold one worker result into the store
    pub fn merge_result(&mut self, message: &ResultMessage) -> Result<MergeOutcome> {
        if self.stale_results == StaleResultPolicy::Drop && message.context() != &self.active_context
        {
            debug!(
                request_id = %message.request_id(),
                result_context = %message.context(),
                active_context = %self.active_context,
                "Dropping result for superseded context"
            );
            log_merge_operation("stale", &message.context().to_string(), "dropped", None);
            return Ok(MergeOutcome::Stale);
        }

        let Some(action) = action_for(message) else {
            return Ok(MergeOutcome::Skipped);
        };

        let action_type = action.action_type();
        self.dispatch(action)?;
        Ok(MergeOutcome::Applied(action_type))
    }
}

/// Translate a result message into the store action it implies
fn action_for(message: &ResultMessage) -> Option<StoreAction> {
    if message.meta.handler_kind != Some(HandlerKind::Data) {
        return None;
    }
    let method = message.meta.method.as_deref()?;

    if !message.success {
        // Only failed fetches invalidate what the store holds
        return matches!(method, methods::QUERY_DATA | methods::ADD_DATA).then_some(
            StoreAction::FetchPatientDataFailure {
                preserve_cache: false,
            },
        );
    }

    let result = message.result.clone().unwrap_or_default();
    match method {
        methods::ADD_DATA => Some(add_success(result)),
        methods::UPDATE_DATUM => result
            .datum
            .map(|datum| StoreAction::UpdateDatumSuccess { datum }),
        methods::REMOVE_DATA => Some(StoreAction::RemoveDataSuccess {
            preserve_cache: result.preserve_cache.unwrap_or(false),
        }),
        methods::QUERY_DATA => Some(StoreAction::QueryDataSuccess {
            windows: result
                .data
                .as_ref()
                .and_then(|data| data.windows())
                .cloned()
                .unwrap_or_default(),
            query: result.query.unwrap_or_default(),
            meta_data: result.meta_data,
            time_prefs: result.time_prefs,
            bg_prefs: result.bg_prefs,
        }),
        _ => None,
    }
}

fn add_success(result: WorkerResult) -> StoreAction {
    let records = result
        .data
        .as_ref()
        .and_then(|data| data.records())
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let meta_data = result.meta_data.unwrap_or_default();

    StoreAction::AddDataSuccess {
        fetched_until: timestamp(&meta_data, "fetchedUntil"),
        cache_until: timestamp(&meta_data, "cacheUntil"),
        records,
        meta_data,
    }
}

fn timestamp(meta_data: &MetaData, key: &str) -> Option<DateTime<Utc>> {
    meta_data
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.with_timezone(&Utc))
}
