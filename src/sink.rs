use crate::poller::LineSink;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("invalid InfluxDB url {0}")]
    InvalidUrl(String),
    #[error("error posting to InfluxDB: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("InfluxDB write returned HTTP {0}")]
    Status(StatusCode),
}

/// Writes line-protocol points to an InfluxDB 1.x `/write` endpoint.
#[derive(Clone, Debug)]
pub struct InfluxSink {
    http: Client,
    write_url: Url,
}

impl InfluxSink {
    pub fn new(host: &str, port: u16, database: &str, timeout: Duration) -> Result<Self, PublishError> {
        let raw = format!("http://{}:{}/write", host.trim(), port);
        let mut write_url = Url::parse(&raw).map_err(|_| PublishError::InvalidUrl(raw.clone()))?;
        write_url.query_pairs_mut().append_pair("db", database);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PublishError::Build)?;
        Ok(Self { http, write_url })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    pub async fn write_lines(&self, body: String) -> Result<(), PublishError> {
        let response = self
            .http
            .post(self.write_url.clone())
            .body(body)
            .send()
            .await
            .map_err(PublishError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status(status));
        }
        Ok(())
    }
}

impl LineSink for InfluxSink {
    async fn publish(&self, line: &str) -> Result<(), PublishError> {
        self.write_lines(line.to_string()).await
    }
}
