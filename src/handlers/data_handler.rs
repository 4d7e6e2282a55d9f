//! # Data Handler
//!
//! Stateful aggregator answering add, remove, single-record update and query
//! requests against the shared dataset. Every operation validates its whole
//! payload before touching the dataset, so a failure leaves it unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::query::build_windows;
use super::{MessageHandler, SharedDataset};
use crate::config::{UpdateMissPolicy, WorkerConfig};
use crate::constants::methods;
use crate::error::{Result, WorkerError};
use crate::messaging::{HandlerKind, ResultData, WindowedData, WorkMessage, WorkerResult};
use crate::models::{combine_unique, DataQuery, Datum, MetaData};

/// Payload of a data message, tagged by its `method` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum DataRequest {
    #[serde(rename_all = "camelCase")]
    AddData {
        data: Vec<Datum>,
        #[serde(default)]
        fetched_until: Option<DateTime<Utc>>,
        #[serde(default)]
        fetched_count: Option<u64>,
        #[serde(default)]
        patient_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    RemoveData {
        #[serde(default)]
        preserve_cache: bool,
    },

    UpdateDatum { datum: Datum },

    QueryData { query: DataQuery },
}

impl DataRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::AddData { .. } => methods::ADD_DATA,
            Self::RemoveData { .. } => methods::REMOVE_DATA,
            Self::UpdateDatum { .. } => methods::UPDATE_DATUM,
            Self::QueryData { .. } => methods::QUERY_DATA,
        }
    }

    /// Parse a message payload; any shape error is a `DataProcessingError`
    pub fn from_message(message: &WorkMessage) -> Result<Self> {
        serde_json::from_value(message.payload().clone()).map_err(|e| {
            WorkerError::data_processing(message.method().unwrap_or("unknown"), e.to_string())
        })
    }

    pub fn to_payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct DataHandler {
    dataset: SharedDataset,
    cache_ttl: Duration,
    update_miss: UpdateMissPolicy,
}

impl DataHandler {
    pub fn new(dataset: SharedDataset, config: &WorkerConfig) -> Self {
        Self {
            dataset,
            cache_ttl: config.cache_ttl(),
            update_miss: config.update_miss,
        }
    }

    pub fn dataset(&self) -> &SharedDataset {
        &self.dataset
    }

    /// Execute a parsed request synchronously against the dataset
    pub fn execute(&self, request: DataRequest) -> Result<WorkerResult> {
        match request {
            DataRequest::AddData {
                data,
                fetched_until,
                fetched_count,
                patient_id,
            } => self.add_data(data, fetched_until, fetched_count, patient_id),
            DataRequest::RemoveData { preserve_cache } => Ok(self.remove_data(preserve_cache)),
            DataRequest::UpdateDatum { datum } => self.update_datum(datum),
            DataRequest::QueryData { query } => self.query_data(query),
        }
    }

    fn add_data(
        &self,
        data: Vec<Datum>,
        fetched_until: Option<DateTime<Utc>>,
        fetched_count: Option<u64>,
        patient_id: Option<String>,
    ) -> Result<WorkerResult> {
        if let Some(datum) = data.iter().find(|d| d.id.is_empty()) {
            return Err(WorkerError::data_processing(
                methods::ADD_DATA,
                format!("record of type '{}' has an empty id", datum.datum_type),
            ));
        }

        let offered = data.len();
        let cache_until = Utc::now().checked_add_signed(self.cache_ttl).ok_or_else(|| {
            WorkerError::data_processing(
                methods::ADD_DATA,
                format!("cache ttl of {} overflows the cache horizon", self.cache_ttl),
            )
        })?;

        let mut dataset = self.dataset.write();
        let accepted = dataset.append_new(data);
        dataset.record_fetch(fetched_until, cache_until, patient_id);

        let mut meta_data = dataset.meta_data();
        // Size is accounted by the merger from the appended records
        meta_data.remove("size");
        drop(dataset);

        debug!(
            offered = offered,
            accepted = accepted.len(),
            fetched_count = fetched_count,
            "Data handler: added records"
        );

        Ok(WorkerResult {
            data: Some(ResultData::Records(accepted)),
            meta_data: Some(meta_data),
            ..WorkerResult::default()
        })
    }

    fn remove_data(&self, preserve_cache: bool) -> WorkerResult {
        self.dataset.write().reset(preserve_cache);
        info!(preserve_cache = preserve_cache, "Data handler: dataset reset");

        WorkerResult {
            preserve_cache: Some(preserve_cache),
            ..WorkerResult::default()
        }
    }

    fn update_datum(&self, datum: Datum) -> Result<WorkerResult> {
        let id = datum.id.clone();
        let replaced = self.dataset.write().replace(datum.clone());

        match (replaced, self.update_miss) {
            (true, _) => Ok(WorkerResult {
                datum: Some(datum),
                ..WorkerResult::default()
            }),
            (false, UpdateMissPolicy::Error) => Err(WorkerError::not_found(id)),
            (false, UpdateMissPolicy::Ignore) => {
                debug!(id = %id, "Data handler: update for unknown record ignored");
                Ok(WorkerResult::default())
            }
        }
    }

    fn query_data(&self, query: DataQuery) -> Result<WorkerResult> {
        let mut dataset = self.dataset.write();
        let windows = build_windows(dataset.records(), &query)?;

        let combined = if query.is_stats_only() {
            dataset.combined().to_vec()
        } else {
            let combined = combine_unique([&windows.prev, &windows.current, &windows.next]);
            dataset.set_combined(combined.clone());
            combined
        };

        dataset.merge_prefs(query.time_prefs.as_ref(), query.bg_prefs.as_ref());
        let meta_data = select_meta_data(dataset.meta_data(), &query.meta_data);
        let time_prefs = dataset.time_prefs().clone();
        let bg_prefs = dataset.bg_prefs().clone();
        drop(dataset);

        Ok(WorkerResult {
            data: Some(ResultData::Windows(WindowedData {
                current: windows.current,
                next: windows.next,
                prev: windows.prev,
                combined: Some(combined),
            })),
            meta_data,
            query: Some(query),
            time_prefs: Some(time_prefs),
            bg_prefs: Some(bg_prefs),
            ..WorkerResult::default()
        })
    }
}

fn select_meta_data(available: MetaData, keys: &[String]) -> Option<MetaData> {
    if keys.is_empty() {
        return None;
    }
    Some(
        available
            .into_iter()
            .filter(|(key, _)| keys.contains(key))
            .collect(),
    )
}

#[async_trait]
impl MessageHandler for DataHandler {
    async fn handle(&self, message: WorkMessage) -> Result<WorkerResult> {
        let request = DataRequest::from_message(&message)?;
        debug!(
            request_id = %message.request_id(),
            method = request.method(),
            "Data handler: executing"
        );
        self.execute(request)
    }

    fn handler_name(&self) -> &str {
        "data_handler"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Data
    }
}
