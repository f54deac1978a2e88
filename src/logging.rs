// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogFormat;

/// OTLP span export target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpConfig {
    /// Traces URL of an OTLP/HTTP collector, e.g. `http://collector:4318/v1/traces`
    pub endpoint: String,
    /// `service.name` resource attribute
    pub service_name: String,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter: {0}")]
    ExporterBuild(String),

    #[error("Tracer provider shutdown failed: {0}")]
    Shutdown(String),
}

/// Owns the span exporter, if one was configured. Call `shutdown` before
/// exit to flush pending spans.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        match &self.provider {
            Some(provider) => provider
                .shutdown()
                .map_err(|e| TelemetryError::Shutdown(e.to_string())),
            None => Ok(()),
        }
    }
}

/// Filter directive: `RUST_LOG` wins, then the policy's `logging.level`,
/// then `info`.
pub fn filter_directive(rust_log: Option<&str>, policy_level: Option<&str>) -> String {
    rust_log
        .or(policy_level)
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or("info")
        .to_lowercase()
}

fn build_provider(config: &OtlpConfig) -> Result<SdkTracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(config.endpoint.clone())
        .build()
        .map_err(|e| TelemetryError::ExporterBuild(e.to_string()))?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build())
}

/// Install the global subscriber, with an OpenTelemetry layer when `otlp`
/// is set. Safe to call more than once; later calls leave the first
/// subscriber in place.
pub fn init(
    format: LogFormat,
    policy_level: Option<&str>,
    otlp: Option<&OtlpConfig>,
) -> Result<TelemetryGuard, TelemetryError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), policy_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = otlp.map(build_provider).transpose()?;
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer("llm-policy-gateway"))
    });

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
        LogFormat::Text => fmt::layer().boxed(),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init();
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }

    if let Some(config) = otlp {
        tracing::info!(
            endpoint = %config.endpoint,
            service_name = %config.service_name,
            "Exporting spans over OTLP"
        );
    }
    Ok(TelemetryGuard { provider })
}
