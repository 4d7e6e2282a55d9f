use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::messaging::WindowedData;
use crate::models::{DataQuery, Datum, MetaData};

/// Transitions of the caller-side canonical store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    /// A fetch was handed to the worker; accounts the fetched count up front
    AddDataRequest {
        fetched_until: Option<DateTime<Utc>>,
        fetched_count: u64,
    },

    AddDataSuccess {
        records: Vec<Datum>,
        meta_data: MetaData,
        fetched_until: Option<DateTime<Utc>>,
        cache_until: Option<DateTime<Utc>>,
    },

    UpdateDatumSuccess {
        datum: Datum,
    },

    RemoveDataRequest {
        preserve_cache: bool,
    },

    RemoveDataSuccess {
        preserve_cache: bool,
    },

    LogoutRequest {
        preserve_cache: bool,
    },

    FetchPatientDataFailure {
        preserve_cache: bool,
    },

    QueryDataSuccess {
        windows: WindowedData,
        query: DataQuery,
        meta_data: Option<MetaData>,
        time_prefs: Option<Map<String, Value>>,
        bg_prefs: Option<Map<String, Value>>,
    },
}

impl StoreAction {
    /// Get a string representation of the action type for logging
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::AddDataRequest { .. } => "add_data_request",
            Self::AddDataSuccess { .. } => "add_data_success",
            Self::UpdateDatumSuccess { .. } => "update_datum_success",
            Self::RemoveDataRequest { .. } => "remove_data_request",
            Self::RemoveDataSuccess { .. } => "remove_data_success",
            Self::LogoutRequest { .. } => "logout_request",
            Self::FetchPatientDataFailure { .. } => "fetch_patient_data_failure",
            Self::QueryDataSuccess { .. } => "query_data_success",
        }
    }

    /// The `preserveCache` flag of reset actions
    pub fn reset_flag(&self) -> Option<bool> {
        match self {
            Self::RemoveDataRequest { preserve_cache }
            | Self::RemoveDataSuccess { preserve_cache }
            | Self::LogoutRequest { preserve_cache }
            | Self::FetchPatientDataFailure { preserve_cache } => Some(*preserve_cache),
            _ => None,
        }
    }
}
