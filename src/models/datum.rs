use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open-ended metadata object (`patientId`, `size`, ...)
///
/// Merging is a shallow key-wise overwrite where the incoming value wins.
pub type MetaData = Map<String, Value>;

/// A single device data record
///
/// Only the identity, type, timestamp and device are interpreted by the
/// worker. Everything else produced by device-data parsing rides along in
/// `fields` untouched.
///
/// # Examples
///
/// ```rust
/// use patient_worker::models::Datum;
///
/// let datum = Datum::new("r1", "smbg").with_field("value", serde_json::json!(5.5));
/// let json = serde_json::to_value(&datum).unwrap();
/// assert_eq!(json["type"], "smbg");
/// assert_eq!(json["value"], 5.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datum {
    pub id: String,

    #[serde(rename = "type")]
    pub datum_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Datum {
    pub fn new(id: impl Into<String>, datum_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            datum_type: datum_type.into(),
            time: None,
            device_id: None,
            fields: Map::new(),
        }
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Calendar day (UTC) used as the aggregation bucket
    pub fn date_key(&self) -> Option<String> {
        self.time.map(|t| t.format("%Y-%m-%d").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_extra_fields_are_flattened() {
        let json = serde_json::json!({
            "id": "abc",
            "type": "cbg",
            "time": "2024-03-01T10:00:00Z",
            "deviceId": "dexcom-1",
            "value": 120,
            "units": "mg/dL"
        });

        let datum: Datum = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(datum.id, "abc");
        assert_eq!(datum.datum_type, "cbg");
        assert_eq!(datum.device_id.as_deref(), Some("dexcom-1"));
        assert_eq!(datum.fields.get("units"), Some(&Value::from("mg/dL")));
        assert_eq!(serde_json::to_value(&datum).unwrap(), json);
    }

    #[test]
    fn test_date_key() {
        let datum = Datum::new("a", "basal")
            .with_time(Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap());
        assert_eq!(datum.date_key().as_deref(), Some("2024-03-01"));
        assert_eq!(Datum::new("b", "basal").date_key(), None);
    }
}
