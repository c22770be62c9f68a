use crate::client::ClientError;
use crate::error::{RequestError, ValidationError};
use crate::fields::RequestParams;
use crate::line_protocol;
use crate::request::SensorQuery;
use crate::sensors::SensorsResponse;
use crate::sink::PublishError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Where sensor snapshots come from.
pub trait SensorSource: Send + Sync {
    fn fetch(
        &self,
        params: &RequestParams,
    ) -> impl Future<Output = Result<SensorsResponse, ClientError>> + Send;
}

/// Where encoded lines go, one line per call.
pub trait LineSink: Send + Sync {
    fn publish(&self, line: &str) -> impl Future<Output = Result<(), PublishError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { samples: usize },
    FetchFailed,
    PublishFailed { delivered: usize },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Published { .. })
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("sensor API request rejected: {0}")]
    Rejected(#[source] ValidationError),
    #[error("invalid sensor API url {0}")]
    InvalidEndpoint(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub success_interval: Duration,
    pub retry_min: Duration,
    pub retry_max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            success_interval: Duration::from_secs(60),
            retry_min: Duration::from_secs(5),
            retry_max: Duration::from_secs(25),
        }
    }
}

impl BackoffPolicy {
    /// Sleep before the next cycle: the fixed interval after a success,
    /// otherwise a uniform draw from `[retry_min, retry_max)`.
    pub fn next_delay<R: Rng + ?Sized>(&self, outcome: &CycleOutcome, rng: &mut R) -> Duration {
        if outcome.is_success() {
            return self.success_interval;
        }
        let lo = duration_millis(self.retry_min);
        let hi = duration_millis(self.retry_max);
        if hi <= lo {
            return self.retry_min;
        }
        Duration::from_millis(rng.gen_range(lo..hi))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Measurement name and tags written with every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
}

pub struct Poller<S, K> {
    source: S,
    sink: K,
    query: SensorQuery,
    target: PublishTarget,
    policy: BackoffPolicy,
}

impl<S, K> Poller<S, K>
where
    S: SensorSource,
    K: LineSink,
{
    pub fn new(
        source: S,
        sink: K,
        query: SensorQuery,
        target: PublishTarget,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            source,
            sink,
            query,
            target,
            policy,
        }
    }

    /// One fetch-normalize-encode-publish pass. Recoverable failures come back
    /// as an outcome; bad requests and a bad API url are errors.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PollError> {
        let params = self.query.to_params()?;

        let response = match self.source.fetch(&params).await {
            Ok(response) => response,
            Err(ClientError::Validation(err)) => return Err(PollError::Rejected(err)),
            Err(ClientError::InvalidUrl { url }) => return Err(PollError::InvalidEndpoint(url)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch sensors");
                return Ok(CycleOutcome::FetchFailed);
            }
        };

        let samples = response.into_samples();
        if let Some(snapshot) = samples.first().and_then(|sample| sample.snapshot_time()) {
            tracing::debug!(snapshot = %snapshot.to_rfc3339(), count = samples.len(), "fetched sensors");
        }

        let lines = line_protocol::encode(&self.target.measurement, &self.target.tags, &samples);
        for (delivered, line) in lines.iter().enumerate() {
            tracing::debug!(%line, "publishing");
            if let Err(err) = self.sink.publish(line).await {
                tracing::warn!(error = %err, delivered, "failed to publish line");
                return Ok(CycleOutcome::PublishFailed { delivered });
            }
        }

        Ok(CycleOutcome::Published {
            samples: lines.len(),
        })
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), PollError> {
        let mut rng = StdRng::from_entropy();
        let mut cycle: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            cycle += 1;
            let span = tracing::info_span!("poll_cycle", cycle);
            let outcome = self.run_cycle().instrument(span).await?;
            let delay = self.policy.next_delay(&outcome, &mut rng);
            match outcome {
                CycleOutcome::Published { samples } => {
                    tracing::info!(samples, delay_secs = delay.as_secs_f64(), "published sensor readings");
                }
                _ => {
                    tracing::info!(?outcome, delay_secs = delay.as_secs_f64(), "cycle failed; backing off");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!("poll loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use anyhow::Result;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeSource {
        responses: Mutex<VecDeque<Result<SensorsResponse, ClientError>>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with(responses: Vec<Result<SensorsResponse, ClientError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SensorSource for FakeSource {
        async fn fetch(&self, _params: &RequestParams) -> Result<SensorsResponse, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(response(0)))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<String>>,
        fail_after: Option<usize>,
        cancel_on_publish: Option<CancellationToken>,
    }

    impl LineSink for RecordingSink {
        async fn publish(&self, line: &str) -> Result<(), PublishError> {
            if let Some(cancel) = &self.cancel_on_publish {
                cancel.cancel();
            }
            let mut lines = self.lines.lock().unwrap();
            if self.fail_after.is_some_and(|limit| lines.len() >= limit) {
                return Err(PublishError::Status(StatusCode::SERVICE_UNAVAILABLE));
            }
            lines.push(line.to_string());
            Ok(())
        }
    }

    impl LineSink for Arc<RecordingSink> {
        async fn publish(&self, line: &str) -> Result<(), PublishError> {
            (**self).publish(line).await
        }
    }

    fn response(rows: usize) -> SensorsResponse {
        SensorsResponse {
            api_version: "V1.0.11-0.0.40".to_string(),
            time_stamp: 1664170828,
            data_time_stamp: 1664170800,
            location_type: Default::default(),
            max_age: 604800,
            firmware_default_version: "7.00".to_string(),
            fields: vec![
                "sensor_index".to_string(),
                "humidity".to_string(),
                "pm2.5".to_string(),
            ],
            data: (0..rows)
                .map(|i| vec![Some(100.0 + i as f64), Some(40.0), Some(10.0)])
                .collect(),
        }
    }

    fn fetch_error() -> ClientError {
        ClientError::Status {
            endpoint: "/sensors",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: None,
            description: None,
        }
    }

    fn query() -> SensorQuery {
        SensorQuery::new(GeoPoint::new(37.77, -122.42).unwrap(), 10.0)
    }

    fn target() -> PublishTarget {
        PublishTarget {
            measurement: "purpleair".to_string(),
            tags: BTreeMap::from([("location".to_string(), "home".to_string())]),
        }
    }

    fn poller<K: LineSink>(source: FakeSource, sink: K) -> Poller<FakeSource, K> {
        Poller::new(source, sink, query(), target(), BackoffPolicy::default())
    }

    #[test]
    fn backoff_delays() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            policy.next_delay(&CycleOutcome::Published { samples: 3 }, &mut rng),
            Duration::from_secs(60)
        );
        for outcome in [CycleOutcome::FetchFailed, CycleOutcome::PublishFailed { delivered: 1 }] {
            for _ in 0..200 {
                let delay = policy.next_delay(&outcome, &mut rng);
                assert!(delay >= Duration::from_secs(5), "{delay:?}");
                assert!(delay < Duration::from_secs(25), "{delay:?}");
            }
        }
    }

    #[test]
    fn degenerate_retry_range_uses_minimum() {
        let policy = BackoffPolicy {
            success_interval: Duration::from_secs(1),
            retry_min: Duration::from_secs(9),
            retry_max: Duration::from_secs(3),
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            policy.next_delay(&CycleOutcome::FetchFailed, &mut rng),
            Duration::from_secs(9)
        );
    }

    #[tokio::test]
    async fn publishes_every_sample() -> Result<()> {
        let sink = Arc::new(RecordingSink::default());
        let p = poller(FakeSource::with(vec![Ok(response(3))]), sink.clone());

        assert_eq!(p.run_cycle().await?, CycleOutcome::Published { samples: 3 });
        let lines = sink.lines.lock().unwrap().clone();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "purpleair,location=home,sensor_index=100 humidity=40.00,pm2.5=10.00,aqi_raw=42 1664170800000000000"
        );
        Ok(())
    }

    #[tokio::test]
    async fn fetch_failure_publishes_nothing() -> Result<()> {
        let sink = Arc::new(RecordingSink::default());
        let p = poller(FakeSource::with(vec![Err(fetch_error())]), sink.clone());

        assert_eq!(p.run_cycle().await?, CycleOutcome::FetchFailed);
        assert!(sink.lines.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn stops_at_first_publish_failure() -> Result<()> {
        let sink = Arc::new(RecordingSink {
            fail_after: Some(2),
            ..Default::default()
        });
        let p = poller(FakeSource::with(vec![Ok(response(5))]), sink.clone());

        assert_eq!(
            p.run_cycle().await?,
            CycleOutcome::PublishFailed { delivered: 2 }
        );
        assert_eq!(sink.lines.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn empty_snapshot_is_a_success() -> Result<()> {
        let p = poller(FakeSource::with(vec![Ok(response(0))]), RecordingSink::default());
        assert_eq!(p.run_cycle().await?, CycleOutcome::Published { samples: 0 });
        Ok(())
    }

    #[tokio::test]
    async fn bad_query_is_fatal() {
        let source = Arc::new(FakeSource::default());
        let mut q = query();
        q.fields.push("not_a_field".to_string());
        let p = Poller::new(
            ArcSource(source.clone()),
            RecordingSink::default(),
            q,
            target(),
            BackoffPolicy::default(),
        );

        let err = p.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            PollError::Request(RequestError::Validation(ValidationError::UnknownField(_)))
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_params_end_the_loop() {
        let source = FakeSource::with(vec![Err(ClientError::Validation(
            ValidationError::UnknownParameter("bogus".to_string()),
        ))]);
        let p = poller(source, RecordingSink::default());

        let err = p.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "sensor API request rejected: unknown parameter bogus");
    }

    #[tokio::test]
    async fn cancelled_before_start_never_fetches() -> Result<()> {
        let source = Arc::new(FakeSource::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let p = Poller::new(
            ArcSource(source.clone()),
            RecordingSink::default(),
            query(),
            target(),
            BackoffPolicy::default(),
        );
        p.run(cancel).await?;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_sleep() -> Result<()> {
        let cancel = CancellationToken::new();
        let source = Arc::new(FakeSource::with(vec![Ok(response(2))]));
        let sink = Arc::new(RecordingSink {
            cancel_on_publish: Some(cancel.clone()),
            ..Default::default()
        });
        let p = Poller::new(
            ArcSource(source.clone()),
            sink.clone(),
            query(),
            target(),
            BackoffPolicy::default(),
        );

        // The 60 s success interval would hang the test if the sleep ignored the token.
        tokio::time::timeout(Duration::from_secs(5), p.run(cancel)).await??;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.lines.lock().unwrap().len(), 2);
        Ok(())
    }

    struct ArcSource(Arc<FakeSource>);

    impl SensorSource for ArcSource {
        async fn fetch(&self, params: &RequestParams) -> Result<SensorsResponse, ClientError> {
            self.0.fetch(params).await
        }
    }

    #[tokio::test]
    async fn invalid_api_url_ends_the_loop() {
        let source = FakeSource::with(vec![Err(ClientError::InvalidUrl {
            url: "not a url/sensors".to_string(),
        })]);
        let p = poller(source, RecordingSink::default());

        let err = p.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PollError::InvalidEndpoint(ref url) if url == "not a url/sensors"));
    }

    #[tokio::test]
    async fn sensor_without_readings_does_not_fail_the_cycle() -> Result<()> {
        let mut snapshot = response(3);
        snapshot.data[1] = vec![Some(101.0), None, None];
        let sink = Arc::new(RecordingSink::default());
        let p = poller(FakeSource::with(vec![Ok(snapshot)]), sink.clone());

        assert_eq!(p.run_cycle().await?, CycleOutcome::Published { samples: 2 });
        let lines = sink.lines.lock().unwrap().clone();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("sensor_index=100 "));
        assert!(lines[1].contains("sensor_index=102 "));
        Ok(())
    }
}
