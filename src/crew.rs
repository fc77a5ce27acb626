//! Crew directory — static crew-identifier → display-name lookup.
//!
//! Pipedrive serializes the crew custom field inconsistently depending on
//! the endpoint and field type: a bare integer, a numeric string, a
//! comma-joined string (`"47,50"` for multi-option enums), or an array.
//! All shapes are accepted; identifiers without a mapping are dropped,
//! never an error.

use std::collections::BTreeMap;

use serde_json::Value;

/// The crew table shipped as config default.
pub fn default_crew_table() -> BTreeMap<i64, String> {
    [
        (47, "Kings"),
        (48, "Johnathan"),
        (49, "Pena"),
        (50, "Hector"),
        (51, "Sebastian"),
        (52, "Anastacio"),
        (53, "Mike"),
        (54, "Kim"),
    ]
    .into_iter()
    .map(|(id, name)| (id, name.to_string()))
    .collect()
}

#[derive(Debug, Clone)]
pub struct CrewDirectory {
    map: BTreeMap<i64, String>,
}

impl CrewDirectory {
    pub fn new(map: BTreeMap<i64, String>) -> Self {
        Self { map }
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.map.get(&id).map(String::as_str)
    }

    /// Resolve display names for a list of ids, preserving input order.
    /// Unmapped ids are filtered out.
    pub fn names(&self, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.map.get(id).cloned())
            .collect()
    }

    /// Resolve display names straight from a raw custom-field value.
    pub fn names_for_field(&self, value: Option<&Value>) -> Vec<String> {
        match value {
            Some(v) => self.names(&parse_field_ids(v)),
            None => Vec::new(),
        }
    }
}

/// Extract crew ids from the raw custom-field value.
pub fn parse_field_ids(value: &Value) -> Vec<i64> {
    match value {
        Value::Number(n) => n.as_i64().into_iter().collect(),
        Value::String(s) => s
            .split(',')
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect(),
        Value::Array(items) => items.iter().flat_map(parse_field_ids).collect(),
        _ => Vec::new(),
    }
}
