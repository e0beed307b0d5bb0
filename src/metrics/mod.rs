//! Metric extraction from controller health records
//!
//! The controller reports health as a list of heterogeneous subsystem records.
//! Extraction merges them into one named snapshot using a fixed field mapping;
//! later records override earlier ones, and the snapshot keeps the order in
//! which each metric was first observed, because the sink commit assigns
//! positions from iteration order.

use std::collections::HashMap;

use serde_json::Value;

/// Fixed field-name mapping: controller field → metric name
const METRIC_MAPPING: &[(&str, &str)] = &[
    ("wan_ip", "IP"),
    ("xput_down", "Download"),
    ("xput_up", "Upload"),
    ("num_guest", "Guests Online"),
    ("latency", "Latency"),
];

/// Order-preserving metric map, rebuilt fully every data-sync cycle.
/// Key order is first-insertion order; re-inserting replaces the value only.
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    keys: Vec<String>,
    values: HashMap<String, Value>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        if !self.values.contains_key(key) {
            self.keys.push(key.to_string());
        }
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate in first-observed order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys
            .iter()
            .map(move |k| (k.as_str(), &self.values[k]))
    }

    /// Debug representation committed to the log after each cycle
    pub fn to_log_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, value) in self.iter() {
            map.insert(key.to_string(), value.clone());
        }
        Value::Object(map)
    }
}

/// Merge a sequence of health records into one snapshot.
/// Unmapped fields are ignored; mapped values pass through unconverted.
pub fn extract(health_records: &[Value]) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();

    for record in health_records {
        let Some(fields) = record.as_object() else {
            continue;
        };

        for (field, value) in fields {
            if let Some((_, metric)) = METRIC_MAPPING.iter().find(|(f, _)| f == field) {
                snapshot.insert(metric, value.clone());
            }
        }
    }

    snapshot
}
