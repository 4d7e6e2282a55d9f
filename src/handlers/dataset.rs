//! Accumulated per-patient dataset owned by the background worker.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::{Datum, MetaData};

/// Records and derived state built up by the data handler
///
/// `records` holds everything added so far; `combined` is the deduplicated
/// view produced by the last type-scoped query plus later additions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetState {
    records: Vec<Datum>,
    positions: HashMap<String, usize>,
    combined: Vec<Datum>,
    fetched_until: Option<DateTime<Utc>>,
    cache_until: Option<DateTime<Utc>>,
    patient_id: Option<String>,
    time_prefs: Map<String, Value>,
    bg_prefs: Map<String, Value>,
}

impl DatasetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Datum] {
        &self.records
    }

    pub fn combined(&self) -> &[Datum] {
        &self.combined
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn fetched_until(&self) -> Option<DateTime<Utc>> {
        self.fetched_until
    }

    pub fn cache_until(&self) -> Option<DateTime<Utc>> {
        self.cache_until
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    pub fn time_prefs(&self) -> &Map<String, Value> {
        &self.time_prefs
    }

    pub fn bg_prefs(&self) -> &Map<String, Value> {
        &self.bg_prefs
    }

    /// Append records whose ids are not yet present; returns the accepted ones
    pub fn append_new(&mut self, batch: Vec<Datum>) -> Vec<Datum> {
        let mut accepted = Vec::with_capacity(batch.len());

        for datum in batch {
            if self.positions.contains_key(&datum.id) {
                continue;
            }
            self.positions.insert(datum.id.clone(), self.records.len());
            self.records.push(datum.clone());
            self.combined.push(datum.clone());
            accepted.push(datum);
        }

        accepted
    }

    /// Replace the record with the same id in place
    ///
    /// Returns `false` and leaves state untouched when the id is unknown.
    pub fn replace(&mut self, datum: Datum) -> bool {
        let Some(&position) = self.positions.get(&datum.id) else {
            return false;
        };

        if let Some(slot) = self.combined.iter_mut().find(|d| d.id == datum.id) {
            *slot = datum.clone();
        }
        self.records[position] = datum;
        true
    }

    pub fn set_combined(&mut self, combined: Vec<Datum>) {
        self.combined = combined;
    }

    pub fn record_fetch(
        &mut self,
        fetched_until: Option<DateTime<Utc>>,
        cache_until: DateTime<Utc>,
        patient_id: Option<String>,
    ) {
        if fetched_until.is_some() {
            self.fetched_until = fetched_until;
        }
        if patient_id.is_some() {
            self.patient_id = patient_id;
        }
        self.cache_until = Some(cache_until);
    }

    /// Shallow-merge preferences; incoming keys win
    pub fn merge_prefs(
        &mut self,
        time_prefs: Option<&Map<String, Value>>,
        bg_prefs: Option<&Map<String, Value>>,
    ) {
        if let Some(prefs) = time_prefs {
            self.time_prefs
                .extend(prefs.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(prefs) = bg_prefs {
            self.bg_prefs
                .extend(prefs.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    /// Metadata describing the dataset as a whole
    pub fn meta_data(&self) -> MetaData {
        let mut meta = MetaData::new();
        meta.insert("size".to_string(), Value::from(self.records.len()));
        if let Some(patient_id) = &self.patient_id {
            meta.insert("patientId".to_string(), Value::from(patient_id.clone()));
        }
        if let Some(fetched_until) = self.fetched_until {
            meta.insert(
                "fetchedUntil".to_string(),
                Value::from(fetched_until.to_rfc3339()),
            );
        }
        if let Some(cache_until) = self.cache_until {
            meta.insert(
                "cacheUntil".to_string(),
                Value::from(cache_until.to_rfc3339()),
            );
        }
        meta
    }

    /// Clear accumulated state
    ///
    /// With `preserve_cache` the fetch horizon, cache expiry and patient id
    /// survive; everything else returns to its initial value.
    pub fn reset(&mut self, preserve_cache: bool) {
        let kept = if preserve_cache {
            (self.fetched_until, self.cache_until, self.patient_id.take())
        } else {
            (None, None, None)
        };

        *self = Self {
            fetched_until: kept.0,
            cache_until: kept.1,
            patient_id: kept.2,
            ..Self::default()
        };
    }
}
