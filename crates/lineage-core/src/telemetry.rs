//! Tracing setup for the `lineage` binary.
//!
//! The filter comes from `LINEAGE_LOG`, then `RUST_LOG`, then the level the
//! caller asks for. Logs always go to stderr: stdout carries command output.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variable specific to this tool; wins over `RUST_LOG`.
pub const LOG_ENV: &str = "LINEAGE_LOG";

/// Install the global subscriber. Later calls are no-ops.
///
/// With `json`, every event is one JSON object per line, carrying the
/// `lineage.dataset` span fields (dataset id and operation).
pub fn init_tracing(json: bool, level: Level) {
    let directives = filter_directives(|key| std::env::var(key).ok(), level);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("ignoring invalid log filter {directives:?}: {e}");
        EnvFilter::new(level.as_str())
    });

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}

/// Directives to build the filter from, looked up through `lookup`.
fn filter_directives<F>(lookup: F, level: Level) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [LOG_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| level.as_str().to_ascii_lowercase())
}
