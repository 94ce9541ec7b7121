//! Tracing initialization.
//!
//! Events are written to stdout by a `tracing-subscriber` fmt layer, human-readable or as JSON
//! lines depending on `logging.format`. `RUST_LOG` takes precedence over `logging.filter`:
//!
//! ```bash
//! RUST_LOG="info,webpanel::db::profiler=warn" webpanel serve
//! ```
//!
//! Notable targets:
//!
//! - `webpanel::audit` - user actions, with `username`, `role` and `action` fields
//! - `webpanel::db::profiler` - timing of every SQL statement

use tracing::{Span, Subscriber, info, info_span};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer(&config.format, std::io::stdout))
        .try_init()?;

    info!(service_name = %config.service_name, format = ?config.format, "Telemetry initialized");
    Ok(())
}

/// Span every process-level future runs in, carrying `service_name`.
///
/// Request handling runs on spawned tasks and gets the same field from the `http_request` span
/// opened by the router's trace layer.
pub fn root_span(config: &LoggingConfig) -> Span {
    info_span!("webpanel", service_name = %config.service_name)
}

/// The fmt layer for `format`, writing to `writer`. JSON lines list every enclosing span so the
/// root span's fields reach nested events.
pub fn fmt_layer<S, W>(format: &LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer().with_writer(writer).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .boxed(),
    }
}
