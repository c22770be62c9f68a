use crate::client::DEFAULT_API_URL;
use crate::error::GeometryError;
use crate::fields::{LocationType, DEFAULT_FIELDS};
use crate::geo::GeoPoint;
use crate::poller::BackoffPolicy;
use crate::request::SensorQuery;
use dotenvy::dotenv;
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const LOCATION_TAG: &str = "location";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Keys given on the command line win over the environment.
#[derive(Debug, Clone, Default)]
pub struct KeyOverrides {
    pub read_key: Option<String>,
    pub write_key: Option<String>,
}

fn lookup_trimmed<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_trimmed(lookup, key).ok_or(ConfigError::Missing(key))
}

fn required_parsed<F, T>(lookup: &F, key: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let value = required(lookup, key)?;
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn optional_parsed<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup_trimmed(lookup, key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

fn tuning<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup_trimmed(lookup, key)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn merge_key(cli: Option<&str>, env_value: Option<String>) -> Option<String> {
    cli.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or(env_value)
}

/// Sensor API access, shared by every command.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub read_key: String,
    pub write_key: Option<String>,
    pub api_url: String,
    pub fetch_timeout_secs: u64,
    pub otlp_endpoint: Option<String>,
}

impl ApiConfig {
    pub fn from_env(keys: &KeyOverrides) -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok(), keys)
    }

    pub fn from_lookup<F>(lookup: F, keys: &KeyOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read_key = merge_key(
            keys.read_key.as_deref(),
            lookup_trimmed(&lookup, "PURPLEAIR_READ_KEY"),
        )
        .ok_or(ConfigError::Missing("PURPLEAIR_READ_KEY"))?;
        let write_key = merge_key(
            keys.write_key.as_deref(),
            lookup_trimmed(&lookup, "PURPLEAIR_WRITE_KEY"),
        );
        let api_url = lookup_trimmed(&lookup, "PURPLEAIR_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            read_key,
            write_key,
            api_url,
            fetch_timeout_secs: tuning(&lookup, "PURPLEAIR_FETCH_TIMEOUT_SECS", 5),
            otlp_endpoint: lookup_trimmed(&lookup, "OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Search area and filters for `/sensors` requests.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub center: GeoPoint,
    pub range_km: f64,
    pub fields: Vec<String>,
    pub location_type: LocationType,
    pub max_age: Option<u64>,
    pub modified_since: Option<u64>,
    pub show_only: Option<String>,
    pub read_keys: Option<String>,
}

impl SearchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let latitude: f64 = required_parsed(&lookup, "PURPLEAIR_LATITUDE")?;
        let longitude: f64 = required_parsed(&lookup, "PURPLEAIR_LONGITUDE")?;
        let center = GeoPoint::new(latitude, longitude)?;
        let range_km: f64 = required_parsed(&lookup, "PURPLEAIR_RANGE_KM")?;
        if !range_km.is_finite() || range_km < 0.0 {
            return Err(GeometryError::InvalidRadius(range_km).into());
        }

        let fields = lookup_trimmed(&lookup, "PURPLEAIR_FIELDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|field| !field.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(|| DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect());

        let location_type = match optional_parsed::<_, u8>(&lookup, "PURPLEAIR_LOCATION_TYPE")? {
            Some(code) => LocationType::try_from(code).map_err(|_| ConfigError::Invalid {
                key: "PURPLEAIR_LOCATION_TYPE",
                value: code.to_string(),
            })?,
            None => LocationType::default(),
        };
        let max_age = optional_parsed(&lookup, "PURPLEAIR_MAX_AGE")?;
        let modified_since = optional_parsed(&lookup, "PURPLEAIR_MODIFIED_SINCE")?;
        let show_only = lookup_trimmed(&lookup, "PURPLEAIR_SHOW_ONLY");
        let read_keys = lookup_trimmed(&lookup, "PURPLEAIR_READ_KEYS");

        Ok(Self {
            center,
            range_km,
            fields,
            location_type,
            max_age,
            modified_since,
            show_only,
            read_keys,
        })
    }

    pub fn query(&self) -> SensorQuery {
        let mut query = SensorQuery::new(self.center, self.range_km);
        query.fields = self.fields.clone();
        query.location_type = self.location_type;
        query.max_age = self.max_age;
        query.modified_since = self.modified_since;
        query.show_only = self.show_only.clone();
        query.read_keys = self.read_keys.clone();
        query
    }
}

/// InfluxDB settings, only needed by the `influx` command.
#[derive(Clone, Debug)]
pub struct PublishConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub measurement: String,
    pub location_tag: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub retry_min_secs: u64,
    pub retry_max_secs: u64,
}

impl PublishConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required(&lookup, "INFLUXDB_HOST")?;
        let port = required_parsed(&lookup, "INFLUXDB_PORT")?;
        let database = required(&lookup, "INFLUXDB_DB")?;
        let measurement = required(&lookup, "INFLUX_MEASUREMENT_NAME")?;
        let location_tag = required(&lookup, "INFLUX_LOCATION_TAG")?;

        Ok(Self {
            host,
            port,
            database,
            measurement,
            location_tag,
            timeout_secs: tuning(&lookup, "INFLUXDB_TIMEOUT_SECS", 2),
            poll_interval_secs: tuning(&lookup, "SIDECAR_POLL_INTERVAL_SECS", 60),
            retry_min_secs: tuning(&lookup, "SIDECAR_RETRY_MIN_SECS", 5),
            retry_max_secs: tuning(&lookup, "SIDECAR_RETRY_MAX_SECS", 25),
        })
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LOCATION_TAG.to_string(), self.location_tag.clone())])
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            success_interval: Duration::from_secs(self.poll_interval_secs),
            retry_min: Duration::from_secs(self.retry_min_secs),
            retry_max: Duration::from_secs(self.retry_max_secs),
        }
    }
}
