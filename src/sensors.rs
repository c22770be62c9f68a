use crate::fields::LocationType;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SENSOR_INDEX_FIELD: &str = "sensor_index";

/// Body of a `/sensors` response. Each row of `data` is one sensor and its
/// cells line up positionally with `fields`; a `null` cell means the sensor
/// does not report that field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorsResponse {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub time_stamp: u64,
    #[serde(default)]
    pub data_time_stamp: u64,
    #[serde(default)]
    pub location_type: LocationType,
    #[serde(default)]
    pub max_age: u64,
    #[serde(default)]
    pub firmware_default_version: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Option<f64>>>,
}

impl SensorsResponse {
    pub fn into_samples(self) -> Vec<Sample> {
        normalize(self.data_time_stamp, &self.fields, &self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "time_stamp")]
    pub timestamp: u64,
    pub data: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            data: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.data.get(field).copied()
    }

    pub fn sensor_index(&self) -> Option<i64> {
        self.get(SENSOR_INDEX_FIELD).map(|value| value.round() as i64)
    }

    pub fn snapshot_time(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.timestamp).ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

/// Turns the sparse sensor matrix into one sample per row, keeping only the
/// cells that carry a value. Absent cells never show up as zero readings.
pub fn normalize(snapshot_timestamp: u64, fields: &[String], rows: &[Vec<Option<f64>>]) -> Vec<Sample> {
    rows.iter()
        .map(|row| {
            let mut sample = Sample::new(snapshot_timestamp);
            for (field, cell) in fields.iter().zip(row) {
                if let Some(value) = cell {
                    sample.data.insert(field.clone(), *value);
                }
            }
            sample
        })
        .collect()
}

pub fn samples_to_pretty_json(samples: &[Sample]) -> serde_json::Result<String> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    samples.serialize(&mut serializer)?;
    // serde_json only ever emits valid UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}
