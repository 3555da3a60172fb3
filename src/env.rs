/// Environment variable names used by this crate for configuring the
/// access log from a service's environment.
///
/// These are purely helpers; the sink and middleware types never read the
/// environment themselves.

/// Destination file path. Empty or unset means standard output.
pub const REQUEST_LOG_PATH_ENV: &str = "REQUEST_LOG_PATH";

/// Flush interval, e.g. `100ms` or `1s`.
pub const REQUEST_LOG_INTERVAL_ENV: &str = "REQUEST_LOG_INTERVAL";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
