use crate::error::ValidationError;
use crate::fields::{validate_params, RequestParams};
use crate::poller::SensorSource;
use crate::sensors::SensorsResponse;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.purpleair.com/v1";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const SENSORS_ENDPOINT: &str = "/sensors";
const KEYS_ENDPOINT: &str = "/keys";

/// Error codes PurpleAir reports in the `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    ApiKeyMissing,
    ApiKeyTypeMismatch,
    ApiKeyInvalid,
    ApiKeyRestricted,
    ApiDisabled,
    InvalidToken,
    Other(String),
}

impl ApiErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "ApiKeyMissingError" => ApiErrorKind::ApiKeyMissing,
            "ApiKeyTypeMismatchError" => ApiErrorKind::ApiKeyTypeMismatch,
            "ApiKeyInvalidError" => ApiErrorKind::ApiKeyInvalid,
            "ApiKeyRestrictedError" => ApiErrorKind::ApiKeyRestricted,
            "ApiDisabledError" => ApiErrorKind::ApiDisabled,
            "InvalidTokenError" => ApiErrorKind::InvalidToken,
            other => ApiErrorKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::ApiKeyMissing => f.write_str("ApiKeyMissingError"),
            ApiErrorKind::ApiKeyTypeMismatch => f.write_str("ApiKeyTypeMismatchError"),
            ApiErrorKind::ApiKeyInvalid => f.write_str("ApiKeyInvalidError"),
            ApiErrorKind::ApiKeyRestricted => f.write_str("ApiKeyRestrictedError"),
            ApiErrorKind::ApiDisabled => f.write_str("ApiDisabledError"),
            ApiErrorKind::InvalidToken => f.write_str("InvalidTokenError"),
            ApiErrorKind::Other(code) => f.write_str(code),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("must provide API read key")]
    MissingReadKey,
    #[error("failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("invalid API url {url}")]
    InvalidUrl { url: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("error getting {endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}{}", api_error_suffix(.kind, .description))]
    Status {
        endpoint: &'static str,
        status: StatusCode,
        kind: Option<ApiErrorKind>,
        description: Option<String>,
    },
    #[error("can not decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: simd_json::Error,
    },
    #[error("expected return code 201 or 403 got {0}")]
    UnexpectedStatus(StatusCode),
}

fn api_error_suffix(kind: &Option<ApiErrorKind>, description: &Option<String>) -> String {
    match (kind, description) {
        (Some(kind), Some(description)) => format!(" ({kind}: {description})"),
        (Some(kind), None) => format!(" ({kind})"),
        _ => String::new(),
    }
}

/// PurpleAir API client authenticated with a read key.
#[derive(Clone, Debug)]
pub struct PurpleAirClient {
    read_key: String,
    /// Only PurpleAir's sensor-management endpoints take the write key, and
    /// nothing here calls them. It is kept so `keys` can report it.
    write_key: Option<String>,
    base_url: String,
    http: Client,
}

impl PurpleAirClient {
    pub fn new(
        read_key: &str,
        write_key: Option<&str>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let read_key = read_key.trim();
        if read_key.is_empty() {
            return Err(ClientError::MissingReadKey);
        }
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if Url::parse(&base_url).is_err() {
            return Err(ClientError::InvalidUrl { url: base_url });
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            read_key: read_key.to_string(),
            write_key: write_key
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            base_url,
            http,
        })
    }

    pub fn has_write_key(&self) -> bool {
        self.write_key.is_some()
    }

    pub fn build_url(&self, endpoint: &str, params: Option<&RequestParams>) -> Result<Url, ClientError> {
        let raw = format!("{}{}", self.base_url, endpoint);
        let mut url = Url::parse(&raw).map_err(|_| ClientError::InvalidUrl { url: raw.clone() })?;
        if let Some(params) = params {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.http
            .get(url)
            .header("X-API-Key", &self.read_key)
            .header("Accept", "application/json")
    }

    /// `true` when PurpleAir accepts the read key (HTTP 201), `false` when it
    /// rejects it (HTTP 403).
    pub async fn keys_valid(&self) -> Result<bool, ClientError> {
        let url = self.build_url(KEYS_ENDPOINT, None)?;
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: KEYS_ENDPOINT,
                source,
            })?;
        match response.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::FORBIDDEN => Ok(false),
            other => Err(ClientError::UnexpectedStatus(other)),
        }
    }

    pub async fn get_sensors(&self, params: &RequestParams) -> Result<SensorsResponse, ClientError> {
        validate_params(params)?;
        let url = self.build_url(SENSORS_ENDPOINT, Some(params))?;
        tracing::debug!(%url, "requesting sensors");

        let transport = |source| ClientError::Transport {
            endpoint: SENSORS_ENDPOINT,
            source,
        };
        let response = self.get(url).send().await.map_err(transport)?;
        let status = response.status();
        let mut body = response.bytes().await.map_err(transport)?.to_vec();

        if !status.is_success() {
            return Err(status_error(SENSORS_ENDPOINT, status, &mut body));
        }

        simd_json::serde::from_slice(&mut body).map_err(|source| ClientError::Decode {
            endpoint: SENSORS_ENDPOINT,
            source,
        })
    }
}

impl SensorSource for PurpleAirClient {
    async fn fetch(&self, params: &RequestParams) -> Result<SensorsResponse, ClientError> {
        self.get_sensors(params).await
    }
}

fn status_error(endpoint: &'static str, status: StatusCode, body: &mut [u8]) -> ClientError {
    let parsed: Option<ApiErrorBody> = simd_json::serde::from_slice(body).ok();
    let (kind, description) = match parsed {
        Some(parsed) => (
            Some(ApiErrorKind::from_code(&parsed.error)),
            parsed.description,
        ),
        None => (None, None),
    };
    ClientError::Status {
        endpoint,
        status,
        kind,
        description,
    }
}
