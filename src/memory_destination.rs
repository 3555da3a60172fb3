use crate::destination::Destination;
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// A destination that keeps every written line in memory.
///
/// Useful for measuring the overhead of the middleware itself without any
/// file I/O, and for tests that want to inspect what was flushed. Clones
/// share the same line store, so keep one clone around before handing the
/// other to a [`BufferedSink`](crate::sink::BufferedSink).
#[derive(Clone, Default)]
pub struct MemoryDestination {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line written so far, in write order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
