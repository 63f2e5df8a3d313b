//! Logging setup and spans for validation runs

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize tracing with environment-based configuration.
///
/// `RUST_LOG` wins when set; otherwise both lincheck crates log at
/// `default_level`. Safe to call more than once, later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "lincheck={level},lincheck_core={level}",
            level = default_level
        ))
    });

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let _ = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

/// Span covering one validation run
#[inline]
pub fn validation_span(source: &str) -> Span {
    tracing::info_span!(
        "validation",
        source = %source,
        confirmed = tracing::field::Empty,
        ambiguous = tracing::field::Empty,
    )
}

/// Span covering the check of one key's history
#[inline]
pub fn partition_span(key: &str, operations: usize) -> Span {
    tracing::debug_span!("partition", key = %key, operations)
}
