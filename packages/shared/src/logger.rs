//! Logging setup for the chat server binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are enabled at the default level.
const APP_TARGETS: [&str; 2] = ["rtchat_server", "rtchat_shared"];

/// Build the default filter directive for the application and the binary.
///
/// ```
/// use rtchat_shared::logger::default_directive;
///
/// assert_eq!(
///     default_directive("rtchat-server", "info"),
///     "rtchat_server=info,rtchat_shared=info,tower_http=info"
/// );
/// ```
pub fn default_directive(binary_name: &str, default_log_level: &str) -> String {
    let mut targets: Vec<String> = APP_TARGETS.iter().map(|t| t.to_string()).collect();
    let binary_target = binary_name.replace('-', "_");
    if !targets.contains(&binary_target) {
        targets.push(binary_target);
    }
    targets.push("tower_http".to_string());

    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "rtchat-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use rtchat_shared::logger::setup_logger;
///
/// setup_logger("rtchat-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
