use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::datum::Datum;

/// Per-type, per-day record counts (`{ "smbg": { "2024-03-01": 4 } }`)
pub type AggregationsByDate = BTreeMap<String, BTreeMap<String, u64>>;

/// Half-open time range `[start, end)`, serialized as a two element array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints(pub DateTime<Utc>, pub DateTime<Utc>);

impl Endpoints {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.1
    }

    pub fn span(&self) -> Duration {
        self.1 - self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 <= self.1
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.0 <= time && time < self.1
    }

    /// Adjacent range of the same span ending where this one starts
    ///
    /// `None` when the start would fall outside the representable time range.
    pub fn previous(&self) -> Option<Self> {
        let start = self.0.checked_sub_signed(self.span())?;
        Some(Self(start, self.0))
    }

    /// Adjacent range of the same span starting where this one ends
    pub fn next(&self) -> Option<Self> {
        let end = self.1.checked_add_signed(self.span())?;
        Some(Self(self.1, end))
    }
}

/// One of the previous/current/next partitions of the dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataWindow {
    /// Records grouped by type
    #[serde(default)]
    pub data: BTreeMap<String, Vec<Datum>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations_by_date: Option<AggregationsByDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
}

impl DataWindow {
    /// Build a window from records, grouping by type and counting per day
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a Datum>,
        endpoints: Option<Endpoints>,
    ) -> Self {
        let mut data: BTreeMap<String, Vec<Datum>> = BTreeMap::new();
        let mut aggregations = AggregationsByDate::new();

        for datum in records {
            if let Some(day) = datum.date_key() {
                *aggregations
                    .entry(datum.datum_type.clone())
                    .or_default()
                    .entry(day)
                    .or_insert(0) += 1;
            }
            data.entry(datum.datum_type.clone())
                .or_default()
                .push(datum.clone());
        }

        Self {
            data,
            aggregations_by_date: Some(aggregations),
            endpoints,
        }
    }

    pub fn datums(&self) -> impl Iterator<Item = &Datum> {
        self.data.values().flatten()
    }

    pub fn record_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

/// Merge windows in order, keeping the first record seen for each id
///
/// Later duplicates are dropped, never overwrite an earlier record.
pub fn combine_unique<'a>(windows: impl IntoIterator<Item = &'a DataWindow>) -> Vec<Datum> {
    let mut seen = HashSet::new();
    let mut combined = Vec::new();

    for datum in windows.into_iter().flat_map(DataWindow::datums) {
        if seen.insert(datum.id.as_str()) {
            combined.push(datum.clone());
        }
    }

    combined
}
