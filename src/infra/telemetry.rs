use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "feedgate_cache_hit_total",
            Unit::Count,
            "Total number of feeds served from the response cache."
        );
        describe_counter!(
            "feedgate_cache_miss_total",
            Unit::Count,
            "Total number of response-cache misses, including store errors."
        );
        describe_counter!(
            "feedgate_cache_evict_total",
            Unit::Count,
            "Total number of in-process cache evictions due to capacity."
        );
        describe_counter!(
            "feedgate_cache_error_total",
            Unit::Count,
            "Total number of cache lookups that failed and were treated as misses."
        );
        describe_counter!(
            "feedgate_coalesced_total",
            Unit::Count,
            "Total number of requests that joined an in-flight computation."
        );
        describe_counter!(
            "feedgate_cache_write_dropped_total",
            Unit::Count,
            "Total number of cache writes dropped because the write queue was full."
        );
        describe_counter!(
            "feedgate_cache_write_failed_total",
            Unit::Count,
            "Total number of cache writes rejected by the backend."
        );
        describe_histogram!(
            "feedgate_request_duration_ms",
            Unit::Milliseconds,
            "Request latency in milliseconds, measured by the logging stage."
        );
    });
}
