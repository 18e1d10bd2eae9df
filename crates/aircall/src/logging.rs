//! Global `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber on stderr.
///
/// `RUST_LOG` wins over `level`. With `json` set, each event is one JSON
/// line; otherwise output is compact text. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a subscriber is already set
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
