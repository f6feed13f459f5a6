//! Logging and optional OpenTelemetry export

use crate::settings::LogFormat;
use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "visitq=info";

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default filter. When the binary is built with
/// the `telemetry` feature and `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans
/// are exported over OTLP as well.
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4318)
/// - `OTEL_SERVICE_NAME`: Service name (default: visitq)
pub fn init(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    let fmt_layer = match format {
        // Production: JSON structured logging
        LogFormat::Json => fmt::layer().json().boxed(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    #[cfg(feature = "telemetry")]
    {
        registry.with(otel::layer()?).try_init()?;
    }

    #[cfg(not(feature = "telemetry"))]
    {
        registry.try_init()?;
        if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
            tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
            tracing::warn!("Rebuild with: cargo build --features telemetry");
        }
    }

    Ok(())
}

/// Flush pending spans
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "telemetry")]
mod otel {
    use anyhow::Result;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{Tracer, TracerProvider};
    use tracing::Subscriber;
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::registry::LookupSpan;

    pub fn layer<S>() -> Result<Option<OpenTelemetryLayer<S, Tracer>>>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
            return Ok(None);
        };
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "visitq".to_string());

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(&endpoint)
            .build()?;
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .build();
        let tracer = provider.tracer(service_name);
        opentelemetry::global::set_tracer_provider(provider);

        Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
    }
}
