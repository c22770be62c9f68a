use crate::aqi::pm25_to_aqi;
use crate::sensors::{Sample, SENSOR_INDEX_FIELD};
use std::collections::BTreeMap;

pub const PM25_ALT_FIELD: &str = "pm2.5_alt";
pub const PM25_FIELD: &str = "pm2.5";
pub const AQI_EPA_FIELD: &str = "aqi_epa";
pub const AQI_RAW_FIELD: &str = "aqi_raw";

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Encodes one line per sample. Tags are written in key order, then the
/// sensor index; fields follow in name order with the derived AQI values last.
/// Samples with no fields to write are skipped.
pub fn encode(measurement: &str, tags: &BTreeMap<String, String>, samples: &[Sample]) -> Vec<String> {
    samples
        .iter()
        .filter_map(|sample| {
            let line = encode_sample(measurement, tags, sample);
            if line.is_none() {
                tracing::debug!(sensor_index = ?sample.sensor_index(), "no readings to publish");
            }
            line
        })
        .collect()
}

/// `None` when the sample carries nothing but its sensor index, since a line
/// needs at least one field.
pub fn encode_sample(measurement: &str, tags: &BTreeMap<String, String>, sample: &Sample) -> Option<String> {
    let mut fields: Vec<String> = sample
        .data
        .iter()
        .filter(|(key, _)| key.as_str() != SENSOR_INDEX_FIELD)
        .map(|(key, value)| format!("{}={:.2}", escape_key(key), value))
        .collect();
    if let Some(pm25_alt) = sample.get(PM25_ALT_FIELD) {
        fields.push(format!("{AQI_EPA_FIELD}={}", pm25_to_aqi(pm25_alt)));
    }
    if let Some(pm25) = sample.get(PM25_FIELD) {
        fields.push(format!("{AQI_RAW_FIELD}={}", pm25_to_aqi(pm25)));
    }
    if fields.is_empty() {
        return None;
    }

    let mut line = escape(measurement, &[',', ' ']);
    for (key, value) in tags {
        line.push_str(&format!(",{}={}", escape_key(key), escape_key(value)));
    }
    if let Some(index) = sample.sensor_index() {
        line.push_str(&format!(",{SENSOR_INDEX_FIELD}={index}"));
    }
    line.push(' ');
    line.push_str(&fields.join(","));

    let nanos = sample.timestamp.saturating_mul(NANOS_PER_SEC);
    line.push_str(&format!(" {nanos}"));
    Some(line)
}

fn escape_key(value: &str) -> String {
    escape(value, &[',', '=', ' '])
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
