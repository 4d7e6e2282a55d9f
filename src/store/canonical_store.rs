//! # Canonical Store
//!
//! The caller's long-lived view of a patient's data. Only the merge path
//! mutates it, one action at a time.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::actions::StoreAction;
use crate::config::{UpdateMissPolicy, WorkerConfig};
use crate::constants::methods;
use crate::error::{Result, WorkerError};
use crate::models::{combine_unique, AggregationsByDate, DataQuery, DataWindow, Datum, MetaData};

/// Settings the reducer needs beyond the action itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeRules {
    pub cache_ttl: Duration,
    pub update_miss: UpdateMissPolicy,
}

impl MergeRules {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            cache_ttl: config.cache_ttl(),
            update_miss: config.update_miss,
        }
    }
}

impl Default for MergeRules {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreData {
    pub aggregations_by_date: Option<AggregationsByDate>,
    pub combined: Vec<Datum>,
    pub current: DataWindow,
    pub next: DataWindow,
    pub prev: DataWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalStore {
    pub data: StoreData,
    pub cache_until: Option<DateTime<Utc>>,
    pub fetched_until: Option<DateTime<Utc>>,
    pub meta_data: MetaData,
    pub query: DataQuery,
    pub time_prefs: Map<String, Value>,
    pub bg_prefs: Map<String, Value>,
}

impl CanonicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running record count kept in `metaData.size`
    pub fn size(&self) -> u64 {
        self.meta_data
            .get("size")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.meta_data.get("patientId").and_then(Value::as_str)
    }

    /// Apply one action
    ///
    /// On error the store is left exactly as it was.
    pub fn apply(&mut self, action: StoreAction, rules: &MergeRules) -> Result<()> {
        match action {
            StoreAction::AddDataRequest {
                fetched_until,
                fetched_count,
            } => {
                let cache_until = Utc::now().checked_add_signed(rules.cache_ttl).ok_or_else(|| {
                    WorkerError::data_processing(
                        methods::ADD_DATA,
                        format!("cache ttl of {} overflows the cache horizon", rules.cache_ttl),
                    )
                })?;
                if fetched_until.is_some() {
                    self.fetched_until = fetched_until;
                }
                self.cache_until = Some(cache_until);
                self.set_size(self.size() + fetched_count);
            }

            StoreAction::AddDataSuccess {
                records,
                meta_data,
                fetched_until,
                cache_until,
            } => {
                let added = records.len() as u64;
                self.data.combined.extend(records);
                self.set_size(self.size() + added);
                merge_into(&mut self.meta_data, meta_data);
                if fetched_until.is_some() {
                    self.fetched_until = fetched_until;
                }
                if cache_until.is_some() {
                    self.cache_until = cache_until;
                }
            }

            StoreAction::UpdateDatumSuccess { datum } => {
                match self.data.combined.iter().position(|d| d.id == datum.id) {
                    Some(index) => self.data.combined[index] = datum,
                    None if rules.update_miss == UpdateMissPolicy::Error => {
                        return Err(WorkerError::not_found(datum.id));
                    }
                    None => {}
                }
            }

            StoreAction::RemoveDataRequest { preserve_cache }
            | StoreAction::RemoveDataSuccess { preserve_cache }
            | StoreAction::LogoutRequest { preserve_cache }
            | StoreAction::FetchPatientDataFailure { preserve_cache } => {
                self.reset(preserve_cache);
            }

            StoreAction::QueryDataSuccess {
                windows,
                query,
                meta_data,
                time_prefs,
                bg_prefs,
            } => {
                if !query.is_stats_only() {
                    self.data.combined =
                        combine_unique([&windows.prev, &windows.current, &windows.next]);
                }
                if let Some(aggregations) = windows.current.aggregations_by_date.clone() {
                    self.data.aggregations_by_date = Some(aggregations);
                }
                self.data.current = windows.current;
                self.data.next = windows.next;
                self.data.prev = windows.prev;

                merge_into(&mut self.time_prefs, time_prefs.unwrap_or_default());
                merge_into(&mut self.bg_prefs, bg_prefs.unwrap_or_default());
                merge_into(&mut self.meta_data, meta_data.unwrap_or_default());
                self.query = query;
            }
        }

        Ok(())
    }

    /// Return to the initial state, optionally keeping the cache fields
    pub fn reset(&mut self, preserve_cache: bool) {
        if !preserve_cache {
            *self = Self::default();
            return;
        }

        let mut meta_data = MetaData::new();
        if let Some(patient_id) = self.meta_data.remove("patientId") {
            meta_data.insert("patientId".to_string(), patient_id);
        }

        *self = Self {
            cache_until: self.cache_until,
            fetched_until: self.fetched_until,
            meta_data,
            ..Self::default()
        };
    }

    fn set_size(&mut self, size: u64) {
        self.meta_data.insert("size".to_string(), Value::from(size));
    }
}

/// Shallow key-wise merge; incoming values win
fn merge_into(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    target.extend(incoming);
}
