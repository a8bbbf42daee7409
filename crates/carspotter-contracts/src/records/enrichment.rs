use serde_json::{Map, Value};

use super::VehicleRecord;

/// Keys owned by the vision identification; a lookup never overwrites them.
pub const IDENTIFICATION_KEYS: [&str; 3] = ["year", "make", "model"];

fn is_identification_key(key: &str) -> bool {
    let normalized = key.trim();
    IDENTIFICATION_KEYS
        .iter()
        .any(|owned| normalized.eq_ignore_ascii_case(owned))
}

/// Folds a specification lookup into the record's enrichment map.
///
/// An empty lookup, or one carrying only identification keys, returns `base`
/// untouched. Colliding enrichment keys take the lookup's value.
pub fn merge(base: VehicleRecord, lookup: Map<String, Value>) -> VehicleRecord {
    let incoming = lookup
        .into_iter()
        .filter(|(key, _)| !is_identification_key(key))
        .collect::<Vec<(String, Value)>>();
    if incoming.is_empty() {
        return base;
    }

    let mut record = base;
    let enrichment = record.enrichment.get_or_insert_with(Map::new);
    for (key, value) in incoming {
        enrichment.insert(key, value);
    }
    record
}
