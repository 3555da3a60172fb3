use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::fmt;
use std::time::Duration;

/// One completed request, as it appears in the access log.
///
/// Renders (via [`Display`](fmt::Display)) as
/// `<client> [<RFC3339>] <METHOD> <host> <path> <elapsed>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub client_addr: String,
    pub timestamp: DateTime<FixedOffset>,
    pub method: String,
    pub host: String,
    pub path: String,
    pub elapsed: Duration,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} {} {} {:?}",
            self.client_addr,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.method,
            self.host,
            self.path,
            self.elapsed,
        )
    }
}
