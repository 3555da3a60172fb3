use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, Stdout};

/// Permission bits for newly created access log files (`rw-r--r--`).
pub const LOG_FILE_MODE: u32 = 0o644;

/// Byte-stream target that buffered access log lines are written to.
///
/// Implementations only need to move bytes. The owning
/// [`BufferedSink`](crate::sink::BufferedSink) serializes every call and
/// tracks whether the destination has been closed, so `write_line` is never
/// invoked concurrently or after `close`.
#[async_trait]
pub trait Destination: Send {
    /// Write one line. The implementation appends the trailing newline.
    async fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Push any bytes still held by the writer down to the device.
    ///
    /// Called once after every non-empty batch. Default implementation is a
    /// no-op.
    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Release the underlying resource.
    async fn close(&mut self) -> io::Result<()>;
}

/// Process standard output.
///
/// Closing stops this destination from writing but leaves the process's
/// stdout descriptor open for everybody else.
pub struct StdoutDestination {
    out: Stdout,
}

impl StdoutDestination {
    pub fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
        }
    }
}

impl Default for StdoutDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Destination for StdoutDestination {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.out.write_all(with_newline(line).as_bytes()).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.out.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.out.flush().await
    }
}

/// An access log file opened in append mode.
pub struct FileDestination {
    path: PathBuf,
    file: Option<File>,
}

impl FileDestination {
    /// Open `path` create-if-absent, write-only and append-only.
    ///
    /// New files get [`LOG_FILE_MODE`] on Unix. Parent directories are not
    /// created.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(LOG_FILE_MODE);

        let file = options.open(&path).await?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file already closed"))
    }
}

#[async_trait]
impl Destination for FileDestination {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.file_mut()?.write_all(with_newline(line).as_bytes()).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file already closed"))?;
        // tokio's File completes writes in the background; wait for them
        // before the handle goes away.
        file.flush().await?;
        file.sync_data().await
    }
}

fn with_newline(line: &str) -> String {
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_destination_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "existing\n").unwrap();

        let mut dest = FileDestination::open(&path).await.unwrap();
        dest.write_line("first").await.unwrap();
        dest.write_line("second").await.unwrap();
        dest.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "existing\nfirst\nsecond\n");
        dest.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn new_file_is_created_with_log_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let mut dest = FileDestination::open(&path).await.unwrap();
        dest.close().await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        // umask can only clear bits
        assert_eq!(mode & !LOG_FILE_MODE, 0);
        assert_ne!(mode & 0o600, 0);
    }

    #[tokio::test]
    async fn write_after_close_reports_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest = FileDestination::open(dir.path().join("access.log")).await.unwrap();
        dest.close().await.unwrap();

        let err = dest.write_line("late").await.unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(dest.close().await.is_err());
    }

    #[tokio::test]
    async fn open_fails_for_missing_directory() {
        let result = FileDestination::open("/invalid/path/that/does/not/exist/access.log").await;
        assert!(result.is_err());
    }
}
