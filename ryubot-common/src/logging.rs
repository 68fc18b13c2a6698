//! Logging utilities for RyuBot.
//!
//! # Noise Filtering
//!
//! By default, noisy library modules (hyper, reqwest, h2, rustls) are set to
//! `warn` so the bot's own records stay readable. `RUST_LOG` overrides the
//! whole filter.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default noisy modules that should be filtered to warn level.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Build the filter directive string for a base level.
fn directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }
    directives
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(log_level)))
}

/// Initialize logging with the given configuration.
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - "json" for structured JSON, anything else for human-readable
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);
    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Generate a new trace ID for following one inbound message through the logs.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Create a tracing span for IM channel message handling.
///
/// # Example
///
/// ```ignore
/// let span = channel_span!("telegram", trace_id, user_id, chat_id = %chat);
/// async { /* handle message */ }.instrument(span).await;
/// ```
#[macro_export]
macro_rules! channel_span {
    ($channel:expr, $trace_id:expr, $user_id:expr) => {
        tracing::info_span!(
            "channel_message",
            channel = $channel,
            trace_id = %$trace_id,
            user_id = %$user_id
        )
    };
    ($channel:expr, $trace_id:expr, $user_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "channel_message",
            channel = $channel,
            trace_id = %$trace_id,
            user_id = %$user_id,
            $($field)*
        )
    };
}

/// Create a tracing span for external API calls.
#[macro_export]
macro_rules! api_call_span {
    ($trace_id:expr, $($field:tt)*) => {
        tracing::info_span!("api_call", trace_id = %$trace_id, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_modules_list() {
        assert!(NOISY_MODULES.contains(&"hyper"));
        assert!(NOISY_MODULES.contains(&"reqwest"));
        assert!(NOISY_MODULES.contains(&"rustls"));
    }

    #[test]
    fn test_directives_pin_noisy_modules() {
        let d = directives("debug");
        assert!(d.starts_with("debug,"));
        assert!(d.contains("reqwest=warn"));
        assert_eq!(d.matches("=warn").count(), NOISY_MODULES.len());
    }

    #[test]
    fn test_generate_trace_id() {
        let id1 = generate_trace_id();
        let id2 = generate_trace_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }
}
