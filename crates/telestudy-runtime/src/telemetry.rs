//! Logging and trace export setup.
//!
//! Call [`init_tracing`] once at startup and keep the returned guard alive
//! until the session ends.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). Use `debug` to see per-tick contact and reset detail. |
//! | `TELESTUDY_LOG_FORMAT=json` | Newline-delimited JSON logs instead of the compact console format. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL (e.g. `http://localhost:4318`). The `session`, `pair` and `trial` spans are exported when set. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = telestudy_runtime::telemetry::init_tracing("telestudy");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_VAR: &str = "TELESTUDY_LOG_FORMAT";

/// Install the global subscriber, with an OTLP layer when an endpoint is
/// configured.
///
/// The returned [`TracerProviderGuard`] flushes exported spans when dropped.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var(LOG_FORMAT_VAR).as_deref() == Ok("json");
    let provider = build_provider(service_name);

    match (&provider, use_json) {
        (Some(p), true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_opentelemetry::layer().with_tracer(p.tracer("telestudy")))
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        (Some(p), false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_opentelemetry::layer().with_tracer(p.tracer("telestudy")))
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        (None, true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        (None, false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
    }

    TracerProviderGuard(provider)
}

/// Shuts the tracer provider down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[telestudy] trace provider shutdown failed: {e}");
        }
    }
}

/// `None` when no endpoint is configured or the exporter cannot be built.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[telestudy] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder().with_service_name(service_name.to_string()).build();

    // The session loop is synchronous and has no async runtime for a batch
    // exporter to run on.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_provider_without_endpoint() {
        // SAFETY: no other test in this crate reads this variable.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("telestudy-test").is_none());
    }

    #[test]
    fn empty_guard_drops_quietly() {
        drop(TracerProviderGuard(None));
    }
}
