//! Stream-to-log adapter for the daemon's stdio.
//!
//! Once the daemon has detached from its controlling terminal, anything
//! written to stdout or stderr would otherwise vanish. [`LoggerStream`]
//! turns such writes into structured log records (stdout at INFO, stderr at
//! WARN) while still exposing the real log file descriptor for low-level
//! consumers such as the panic handler.

use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, RawFd};

/// Which standard stream the adapter stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Replacement for stdout; lines are logged at INFO.
    Stdout,
    /// Replacement for stderr; lines are logged at WARN.
    Stderr,
}

/// A `Write` sink that forwards complete lines to the log.
///
/// Each write is split into lines, trailing whitespace is stripped, and
/// empty lines are dropped. The adapter never buffers across writes; a
/// partial line is emitted as its own record rather than held back.
#[derive(Debug)]
pub struct LoggerStream {
    kind: StreamKind,
    log_fd: RawFd,
}

impl LoggerStream {
    /// Creates a stdout adapter backed by the given log file.
    #[must_use]
    pub fn stdout(log: &File) -> Self {
        Self {
            kind: StreamKind::Stdout,
            log_fd: log.as_raw_fd(),
        }
    }

    /// Creates a stderr adapter backed by the given log file.
    #[must_use]
    pub fn stderr(log: &File) -> Self {
        Self {
            kind: StreamKind::Stderr,
            log_fd: log.as_raw_fd(),
        }
    }

    /// The stream this adapter stands in for.
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    fn emit(&self, line: &str) {
        match self.kind {
            StreamKind::Stdout => tracing::info!(target: "velador::stdio", "{line}"),
            StreamKind::Stderr => tracing::warn!(target: "velador::stdio", "{line}"),
        }
    }
}

impl Write for LoggerStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.split('\n') {
            let line = line.trim_end();
            if !line.is_empty() {
                self.emit(line);
            }
        }
        Ok(buf.len())
    }

    // Records are emitted eagerly, so there is nothing to flush.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for LoggerStream {
    /// Returns the underlying log file descriptor, for consumers that need
    /// a real fd rather than a `Write` facade.
    fn as_raw_fd(&self) -> RawFd {
        self.log_fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_file() -> (tempfile::TempDir, File) {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("out.log")).unwrap();
        (dir, file)
    }

    #[test]
    fn test_write_reports_full_length() {
        let (_dir, file) = log_file();
        let mut stream = LoggerStream::stdout(&file);
        let n = stream.write(b"one line\nsecond line\n").unwrap();
        assert_eq!(n, 21);
    }

    #[test]
    fn test_write_accepts_partial_line() {
        let (_dir, file) = log_file();
        let mut stream = LoggerStream::stderr(&file);
        let n = stream.write(b"no trailing newline").unwrap();
        assert_eq!(n, 19);
    }

    #[test]
    fn test_write_tolerates_invalid_utf8() {
        let (_dir, file) = log_file();
        let mut stream = LoggerStream::stdout(&file);
        assert!(stream.write(&[0xff, 0xfe, b'\n']).is_ok());
    }

    #[test]
    fn test_flush_is_noop() {
        let (_dir, file) = log_file();
        let mut stream = LoggerStream::stdout(&file);
        assert!(stream.flush().is_ok());
    }

    #[test]
    fn test_exposes_log_fd() {
        let (_dir, file) = log_file();
        let stream = LoggerStream::stderr(&file);
        assert_eq!(stream.as_raw_fd(), file.as_raw_fd());
        assert_eq!(stream.kind(), StreamKind::Stderr);
    }
}
