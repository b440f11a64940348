//! Jarlsmad: streaming chat completions against the Venice API, plus the
//! persona registry for the Jarlheim tavern agents.

pub mod agents;
pub mod commands;
pub mod inference;

/// Env var selecting the log line format. `json` switches to structured output.
pub const LOG_FORMAT_ENV: &str = "JARLSMAD_LOG_FORMAT";

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so streamed completion text on stdout is never
/// interleaved with them. The filter comes from `RUST_LOG`, falling back to
/// `jarlsmad=info,warn`. Calling this twice is harmless; the second call
/// leaves the first subscriber in place.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jarlsmad=info,warn"));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if json {
        builder.json().with_ansi(false).try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            json,
            "jarlsmad starting"
        );
    }
}
