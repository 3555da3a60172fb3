use std::io;
use std::path::PathBuf;

/// Error type returned by [`BufferedSink`](crate::sink::BufferedSink) and the
/// middleware constructors.
///
/// Only [`SinkError::Open`] ever reaches the caller of a constructor; the
/// other variants come out of explicit `flush` / `close` calls.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to open access log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("access log destination already closed")]
    Closed,

    #[error("access log destination I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SinkError {
    /// `true` for the "resource closed" condition.
    pub fn is_closed(&self) -> bool {
        matches!(self, SinkError::Closed)
    }
}

/// Error type returned when a flush interval string cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty interval")]
    Empty,

    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration {0:?} overflows")]
    Overflow(String),

    #[error("duration {0:?} is not positive")]
    NonPositive(String),
}
