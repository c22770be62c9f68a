use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Query parameters for the `/sensors` endpoint, keyed by parameter name.
pub type RequestParams = BTreeMap<String, String>;

pub const SENSOR_FIELDS: &[&str] = &[
    "name",
    "icon",
    "model",
    "hardware",
    "location_type",
    "private",
    "latitude",
    "longitude",
    "altitude",
    "position_rating",
    "led_brightness",
    "firmware_version",
    "firmware_upgrade",
    "rssi",
    "uptime",
    "pa_latency",
    "memory",
    "last_seen",
    "last_modified",
    "date_created",
    "channel_state",
    "channel_flags",
    "channel_flags_manual",
    "channel_flags_auto",
    "confidence",
    "confidence_manual",
];

pub const ENVIRONMENTAL_FIELDS: &[&str] = &[
    "humidity",
    "humidity_a",
    "humidity_b",
    "temperature",
    "temperature_a",
    "temperature_b",
    "pressure",
    "pressure_a",
    "pressure_b",
];

pub const MISC_FIELDS: &[&str] = &["voc", "voc_a", "voc_b", "ozone1", "analog_input"];

pub const PM1_FIELDS: &[&str] = &[
    "pm1.0",
    "pm1.0_a",
    "pm1.0_b",
    "pm1.0_atm",
    "pm1.0_atm_a",
    "pm1.0_atm_b",
    "pm1.0_cf_1",
    "pm1.0_cf_1_a",
    "pm1.0_cf_1_b",
];

pub const PM25_FIELDS: &[&str] = &[
    "pm2.5_alt",
    "pm2.5_alt_a",
    "pm2.5_alt_b",
    "pm2.5",
    "pm2.5_a",
    "pm2.5_b",
    "pm2.5_atm",
    "pm2.5_atm_a",
    "pm2.5_atm_b",
    "pm2.5_cf_1",
    "pm2.5_cf_1_a",
    "pm2.5_cf_1_b",
];

pub const PM25_AVERAGE_FIELDS: &[&str] = &[
    "pm2.5_10minute",
    "pm2.5_10minute_a",
    "pm2.5_10minute_b",
    "pm2.5_30minute",
    "pm2.5_30minute_a",
    "pm2.5_30minute_b",
    "pm2.5_60minute",
    "pm2.5_60minute_a",
    "pm2.5_60minute_b",
    "pm2.5_6hour",
    "pm2.5_6hour_a",
    "pm2.5_6hour_b",
    "pm2.5_24hour",
    "pm2.5_24hour_a",
    "pm2.5_24hour_b",
    "pm2.5_1week",
    "pm2.5_1week_a",
    "pm2.5_1week_b",
];

pub const PM10_FIELDS: &[&str] = &[
    "pm10.0",
    "pm10.0_a",
    "pm10.0_b",
    "pm10.0_atm",
    "pm10.0_atm_a",
    "pm10.0_atm_b",
    "pm10.0_cf_1",
    "pm10.0_cf_1_a",
    "pm10.0_cf_1_b",
];

pub const URL_PARAMS: &[&str] = &[
    "fields",
    "location_type",
    "read_keys",
    "show_only",
    "modified_since",
    "max_age",
    "nwlng",
    "nwlat",
    "selng",
    "selat",
];

pub const DEFAULT_FIELDS: &[&str] = &[
    "humidity",
    "temperature",
    "voc",
    "pm1.0",
    "pm2.5",
    "pm10.0",
    "pm2.5_alt",
];

const FIELD_GROUPS: &[&[&str]] = &[
    SENSOR_FIELDS,
    ENVIRONMENTAL_FIELDS,
    MISC_FIELDS,
    PM1_FIELDS,
    PM25_FIELDS,
    PM25_AVERAGE_FIELDS,
    PM10_FIELDS,
];

pub fn all_fields() -> impl Iterator<Item = &'static str> {
    FIELD_GROUPS.iter().flat_map(|group| group.iter().copied())
}

pub fn is_valid_field(name: &str) -> bool {
    all_fields().any(|field| field == name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LocationType {
    #[default]
    Outside,
    Inside,
}

impl LocationType {
    pub fn code(self) -> u8 {
        match self {
            LocationType::Outside => 0,
            LocationType::Inside => 1,
        }
    }
}

impl TryFrom<u8> for LocationType {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LocationType::Outside),
            1 => Ok(LocationType::Inside),
            other => Err(ValidationError::InvalidLocationType(other.to_string())),
        }
    }
}

impl From<LocationType> for u8 {
    fn from(value: LocationType) -> Self {
        value.code()
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Checks every parameter against the known URL parameters and every requested
/// field against the field catalog. The first offending token is reported.
pub fn validate_params(params: &RequestParams) -> Result<(), ValidationError> {
    for (key, value) in params {
        match key.as_str() {
            "fields" => {
                if let Some(field) = value.split(',').find(|field| !is_valid_field(field)) {
                    return Err(ValidationError::UnknownField(field.to_string()));
                }
            }
            "location_type" => {
                if value != "0" && value != "1" {
                    return Err(ValidationError::InvalidLocationType(value.clone()));
                }
            }
            other if URL_PARAMS.contains(&other) => {}
            other => return Err(ValidationError::UnknownParameter(other.to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn catalog_has_expected_groups() {
        assert_eq!(all_fields().count(), 88);
        assert!(is_valid_field("pm2.5_alt"));
        assert!(is_valid_field("confidence_manual"));
        assert!(is_valid_field("pm10.0_cf_1_b"));
        assert!(!is_valid_field("sensor_index"));
        assert!(DEFAULT_FIELDS.iter().all(|field| is_valid_field(field)));
    }

    #[test]
    fn accepts_known_fields() {
        let good = params(&[
            ("fields", "humidity,temperature,voc,pm1.0,pm2.5,pm10.0"),
            ("location_type", "0"),
        ]);
        assert_eq!(validate_params(&good), Ok(()));
        assert_eq!(validate_params(&good), Ok(()));

        let minimal = params(&[("fields", "humidity,temperature"), ("location_type", "1")]);
        assert_eq!(validate_params(&minimal), Ok(()));
    }

    #[test]
    fn accepts_bounds_and_filters() {
        let good = params(&[
            ("fields", "pm2.5"),
            ("location_type", "0"),
            ("max_age", "3600"),
            ("modified_since", "1664170000"),
            ("read_keys", "abc"),
            ("show_only", "15111"),
            ("nwlng", "-122.5"),
            ("nwlat", "37.8"),
            ("selng", "-122.3"),
            ("selat", "37.7"),
        ]);
        assert_eq!(validate_params(&good), Ok(()));
    }

    #[test]
    fn rejects_unknown_field() {
        let bad = params(&[("fields", "not_a_field"), ("location_type", "0")]);
        assert_eq!(
            validate_params(&bad),
            Err(ValidationError::UnknownField("not_a_field".to_string()))
        );

        let mixed = params(&[
            ("fields", "humidity,bad_field,pm2.5"),
            ("location_type", "0"),
        ]);
        assert_eq!(
            validate_params(&mixed),
            Err(ValidationError::UnknownField("bad_field".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_parameter_and_location_type() {
        assert_eq!(
            validate_params(&params(&[("bogus", "x")])),
            Err(ValidationError::UnknownParameter("bogus".to_string()))
        );
        assert_eq!(
            validate_params(&params(&[("fields", "humidity"), ("location_type", "2")])),
            Err(ValidationError::InvalidLocationType("2".to_string()))
        );
    }

    #[test]
    fn location_type_codes() {
        assert_eq!(LocationType::try_from(0), Ok(LocationType::Outside));
        assert_eq!(LocationType::try_from(1), Ok(LocationType::Inside));
        assert!(LocationType::try_from(7).is_err());
        assert_eq!(LocationType::Inside.to_string(), "1");
    }
}
