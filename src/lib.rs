pub mod error;
pub mod record;
pub mod destination;
pub mod memory_destination;
pub mod sink;
pub mod interval;
pub mod scheduler;
pub mod middleware;

pub mod config;
pub mod env;
pub mod init;

pub use config::Config;
pub use error::SinkError;
pub use middleware::{ClientAddr, RequestLogger, RequestLoggerLayer};
pub use sink::BufferedSink;
