use proptest::prelude::*;
use proptest::strategy::Just;

use patient_worker::models::Datum;

/// Strategy for generating record types
pub fn datum_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("cbg".to_string()),
        Just("smbg".to_string()),
        Just("bolus".to_string()),
        Just("basal".to_string()),
        Just("wizard".to_string()),
    ]
}

/// Strategy for generating record ids drawn from a small pool, so collisions occur
pub fn datum_id_strategy() -> impl Strategy<Value = String> {
    (0u8..40).prop_map(|n| format!("rec-{n}"))
}

/// Strategy for generating records with an opaque numeric value
pub fn datum_strategy() -> impl Strategy<Value = Datum> {
    (datum_id_strategy(), datum_type_strategy(), 0u16..400).prop_map(|(id, datum_type, value)| {
        Datum::new(id, datum_type).with_field("value", serde_json::json!(value))
    })
}

/// Strategy for generating record batches that may contain duplicate ids
pub fn datum_batch_strategy() -> impl Strategy<Value = Vec<Datum>> {
    prop::collection::vec(datum_strategy(), 0..30)
}

/// Strategy for generating records with unique ids
pub fn unique_batch_strategy(prefix: &'static str) -> impl Strategy<Value = Vec<Datum>> {
    (0usize..20, datum_type_strategy()).prop_map(move |(count, datum_type)| {
        (0..count)
            .map(|n| Datum::new(format!("{prefix}-{n}"), datum_type.clone()))
            .collect()
    })
}

/// Strategy for generating a sequence of request ids for one context
pub fn request_ids_strategy() -> impl Strategy<Value = Vec<String>> {
    (1usize..25).prop_map(|count| (0..count).map(|n| format!("req-{n:03}")).collect())
}

/// Strategy for generating patient contexts
pub fn context_strategy() -> impl Strategy<Value = String> {
    "[a-z]{2}[0-9]{1,3}"
}
