use crate::env::{env_or, REQUEST_LOG_INTERVAL_ENV, REQUEST_LOG_PATH_ENV};
use crate::interval::FlushInterval;
use serde::Deserialize;

/// Access log middleware configuration.
///
/// **Fields**
/// - `path`: destination file. Empty means standard output.
/// - `interval`: how often buffered lines are flushed, e.g. `"100ms"`.
///   Empty, unparseable or non-positive values make the middleware flush as
///   soon as anything is buffered instead.
///
/// Both fields default to the empty string, which is also what
/// [`Config::default`] produces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub path: String,
    pub interval: String,
}

impl Config {
    pub fn new(path: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            interval: interval.into(),
        }
    }

    /// Build a config from [`REQUEST_LOG_PATH_ENV`] and
    /// [`REQUEST_LOG_INTERVAL_ENV`], treating unset variables as empty.
    pub fn from_env() -> Self {
        Self {
            path: env_or(REQUEST_LOG_PATH_ENV, ""),
            interval: env_or(REQUEST_LOG_INTERVAL_ENV, ""),
        }
    }

    pub fn flush_interval(&self) -> FlushInterval {
        FlushInterval::parse(&self.interval)
    }
}
