//! Disk manager: owns the set of open paged files and performs
//! positional page I/O against them.
//!
//! Files are addressed by engine-level [`FileId`]s, not OS descriptors.
//! Each open file carries its path (for diagnostics) and a next-page
//! counter that is the allocation authority consumed by the buffer
//! pool's `new_page`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use silt_error::{Result, SiltError};
use silt_types::{FileId, PAGE_SIZE};

struct FileEntry {
    path: PathBuf,
    file: Mutex<File>,
    next_page_no: AtomicI32,
}

#[derive(Default)]
struct DiskState {
    files: HashMap<FileId, Arc<FileEntry>>,
    open_paths: HashMap<PathBuf, FileId>,
    next_fd: u32,
}

/// Process-wide table of open paged files.
#[derive(Default)]
pub struct DiskManager {
    state: Mutex<DiskState>,
}

impl DiskManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty file on disk. Fails if the path already exists.
    pub fn create_file(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(SiltError::FileExists {
                path: path.to_path_buf(),
            });
        }
        File::create(path)?;
        Ok(())
    }

    /// Remove a file from disk. Fails if it is missing or still open.
    pub fn destroy_file(&self, path: &Path) -> Result<()> {
        if self.state.lock().open_paths.contains_key(path) {
            return Err(SiltError::FileInUse {
                path: path.to_path_buf(),
            });
        }
        if !path.exists() {
            return Err(SiltError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        std::fs::remove_file(path)?;
        tracing::debug!(path = %path.display(), "destroyed file");
        Ok(())
    }

    /// Open an existing file and register it under a fresh [`FileId`].
    ///
    /// A file may be open at most once; a second open of the same path
    /// fails with [`SiltError::FileInUse`].
    pub fn open_file(&self, path: &Path) -> Result<FileId> {
        if !path.exists() {
            return Err(SiltError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let num_pages = (len / PAGE_SIZE as u64) as i32;

        let mut state = self.state.lock();
        if state.open_paths.contains_key(path) {
            return Err(SiltError::FileInUse {
                path: path.to_path_buf(),
            });
        }
        let fd = FileId::new(state.next_fd);
        state.next_fd += 1;
        state.open_paths.insert(path.to_path_buf(), fd);
        state.files.insert(
            fd,
            Arc::new(FileEntry {
                path: path.to_path_buf(),
                file: Mutex::new(file),
                next_page_no: AtomicI32::new(num_pages),
            }),
        );
        Ok(fd)
    }

    /// Close an open file, dropping its descriptor.
    pub fn close_file(&self, fd: FileId) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .files
            .remove(&fd)
            .ok_or(SiltError::UnknownFile { fd: fd.get() })?;
        state.open_paths.remove(&entry.path);
        Ok(())
    }

    /// The path a file id was opened under, for error diagnostics.
    pub fn get_file_name(&self, fd: FileId) -> Result<String> {
        let entry = self.entry(fd)?;
        Ok(entry.path.display().to_string())
    }

    /// Hand out the next page number of a file.
    pub fn allocate_page(&self, fd: FileId) -> Result<i32> {
        let entry = self.entry(fd)?;
        Ok(entry.next_page_no.fetch_add(1, Ordering::SeqCst))
    }

    /// Seed the next-page counter, typically from a file header read at
    /// open time.
    pub fn set_next_page_no(&self, fd: FileId, page_no: i32) -> Result<()> {
        let entry = self.entry(fd)?;
        entry.next_page_no.store(page_no, Ordering::SeqCst);
        Ok(())
    }

    /// Read one page into `buf`.
    ///
    /// A read past the current end of file observes zero-filled content;
    /// freshly allocated pages are never written before first use.
    pub fn read_page(&self, fd: FileId, page_no: i32, buf: &mut [u8]) -> Result<()> {
        debug_assert!(page_no >= 0, "negative page number");
        let entry = self.entry(fd)?;
        let mut file = entry.file.lock();
        file.seek(SeekFrom::Start(page_offset(page_no)))?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                buf[total..].fill(0);
                break;
            }
            total += n;
        }
        Ok(())
    }

    /// Write one page from `buf`.
    pub fn write_page(&self, fd: FileId, page_no: i32, buf: &[u8]) -> Result<()> {
        debug_assert!(page_no >= 0, "negative page number");
        let entry = self.entry(fd)?;
        let mut file = entry.file.lock();
        file.seek(SeekFrom::Start(page_offset(page_no)))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn entry(&self, fd: FileId) -> Result<Arc<FileEntry>> {
        self.state
            .lock()
            .files
            .get(&fd)
            .cloned()
            .ok_or(SiltError::UnknownFile { fd: fd.get() })
    }
}

#[inline]
fn page_offset(page_no: i32) -> u64 {
    page_no as u64 * PAGE_SIZE as u64
}
