mod aqi;
mod cli;
mod client;
mod config;
mod error;
mod fields;
mod geo;
mod line_protocol;
mod poller;
mod request;
mod sensors;
mod sink;
#[cfg(test)]
mod test_support;

use crate::cli::{Args, Command};
use crate::client::PurpleAirClient;
use crate::config::{ApiConfig, PublishConfig, SearchConfig};
use crate::poller::{Poller, PublishTarget};
use crate::sink::InfluxSink;
use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

fn init_tracing(config: &ApiConfig) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,airquality_sidecar=info".into());
    // stdout carries the `sensors` JSON; logs stay on stderr.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true);

    if let Some(endpoint) = &config.otlp_endpoint {
        let endpoint = normalize_otlp_http_endpoint(endpoint);
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint);
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "airquality-sidecar"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

fn normalize_otlp_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains("/v1/traces") {
        return trimmed.to_string();
    }
    format!("{}/v1/traces", trimmed.trim_end_matches('/'))
}

fn build_client(config: &ApiConfig) -> Result<PurpleAirClient> {
    PurpleAirClient::new(
        &config.read_key,
        config.write_key.as_deref(),
        &config.api_url,
        config.fetch_timeout(),
    )
    .context("failed to create PurpleAir client")
}

async fn run_influx(api: &ApiConfig) -> Result<()> {
    let search = SearchConfig::from_env()?;
    let publish = PublishConfig::from_env()?;
    let client = build_client(api)?;
    let sink = InfluxSink::new(&publish.host, publish.port, &publish.database, publish.timeout())?;
    tracing::info!(
        write_url = %sink.write_url(),
        measurement = %publish.measurement,
        range_km = search.range_km,
        "starting poll loop"
    );

    let target = PublishTarget {
        measurement: publish.measurement.clone(),
        tags: publish.tags(),
    };
    let poller = Poller::new(client, sink, search.query(), target, publish.backoff_policy());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
        }
        shutdown.cancel();
    });

    poller.run(cancel).await?;
    Ok(())
}

async fn run_sensors(api: &ApiConfig) -> Result<()> {
    let search = SearchConfig::from_env()?;
    let client = build_client(api)?;
    let params = search.query().to_params()?;
    let samples = client.get_sensors(&params).await?.into_samples();
    println!("{}", sensors::samples_to_pretty_json(&samples)?);
    Ok(())
}

async fn run_keys(api: &ApiConfig) -> Result<()> {
    let client = build_client(api)?;
    tracing::info!(write_key = client.has_write_key(), "checking read key");
    if !client.keys_valid().await? {
        bail!("PurpleAir rejected the read key");
    }
    println!("read key is valid");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let api = ApiConfig::from_env(&args.key_overrides())?;
    init_tracing(&api)?;

    match args.command {
        Command::Influx => run_influx(&api).await,
        Command::Sensors => run_sensors(&api).await,
        Command::Keys => run_keys(&api).await,
    }
}
