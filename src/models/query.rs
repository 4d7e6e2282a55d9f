use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::window::Endpoints;

/// Query sent to the data handler
///
/// A query with no `types` (or an empty list) is a stats-only query: it must
/// leave the combined collection untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stats: Vec<String>,

    /// Metadata keys to echo back in the result
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_data: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_prefs: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_prefs: Option<Map<String, Value>>,
}

impl DataQuery {
    pub fn for_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: Some(types.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn stats_only() -> Self {
        Self::default()
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Requested types, or `None` for a stats-only query
    pub fn requested_types(&self) -> Option<&[String]> {
        self.types.as_deref().filter(|types| !types.is_empty())
    }

    pub fn is_stats_only(&self) -> bool {
        self.requested_types().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_type_list_is_stats_only() {
        assert!(DataQuery::stats_only().is_stats_only());
        assert!(DataQuery::for_types(Vec::<String>::new()).is_stats_only());
        assert!(!DataQuery::for_types(["smbg"]).is_stats_only());
    }

    #[test]
    fn test_query_wire_format() {
        let query: DataQuery = serde_json::from_value(serde_json::json!({
            "types": ["cbg", "smbg"],
            "stats": ["averageGlucose"],
            "metaData": ["size", "patientId"],
            "timePrefs": {"timezoneAware": true}
        }))
        .unwrap();

        assert_eq!(query.requested_types().unwrap().len(), 2);
        assert_eq!(query.meta_data, vec!["size", "patientId"]);
        assert!(query.bg_prefs.is_none());
    }
}
