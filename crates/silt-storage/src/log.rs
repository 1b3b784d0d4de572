//! Best-effort log manager.
//!
//! Records appended here sit in an in-memory buffer until
//! [`LogManager::flush_log_to_disk`] drains them to the backing file and
//! fsyncs. The transaction manager flushes once at commit and once at
//! abort; durability and crash recovery are not provided at this layer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use silt_error::Result;

struct LogInner {
    buffer: Vec<u8>,
    file: File,
}

/// Append-only log buffer backed by a file.
pub struct LogManager {
    inner: Mutex<LogInner>,
}

impl LogManager {
    /// Open (creating if necessary) the log file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            inner: Mutex::new(LogInner {
                buffer: Vec::new(),
                file,
            }),
        })
    }

    /// Append a record to the in-memory log buffer.
    pub fn append(&self, record: &[u8]) {
        self.inner.lock().buffer.extend_from_slice(record);
    }

    /// Drain the buffer to the backing file and fsync it.
    pub fn flush_log_to_disk(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.buffer.is_empty() {
            let buffer = std::mem::take(&mut inner.buffer);
            inner.file.write_all(&buffer)?;
        }
        inner.file.sync_data()?;
        Ok(())
    }

    /// Bytes currently buffered and not yet flushed.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.inner.lock().buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flush_drains_buffer_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("silt.log");
        let log = LogManager::open(&path).unwrap();

        log.append(b"begin 1;");
        log.append(b"commit 1;");
        assert_eq!(log.buffered_bytes(), 17);

        log.flush_log_to_disk().unwrap();
        assert_eq!(log.buffered_bytes(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"begin 1;commit 1;");
    }

    #[test]
    fn test_flush_empty_buffer_is_ok() {
        let dir = TempDir::new().unwrap();
        let log = LogManager::open(&dir.path().join("silt.log")).unwrap();
        log.flush_log_to_disk().unwrap();
    }
}
