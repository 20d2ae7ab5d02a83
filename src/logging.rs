//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Map a `--log-level` value to an `EnvFilter` directive.
///
/// `http` and `verbose` are treated as `debug`, `silly` as `trace`. Anything
/// else is passed through, so full directives such as `mongo2pg=debug` work.
pub fn level_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "http" | "verbose" => "debug".to_string(),
        "silly" => "trace".to_string(),
        "error" | "warn" | "info" | "debug" | "trace" => level.trim().to_ascii_lowercase(),
        _ => level.trim().to_string(),
    }
}

/// Build the filter: `--log-level`, then `RUST_LOG`, then `info`.
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level_directive(level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Install the global fmt subscriber.
pub fn init(level: Option<&str>) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .init();
}
