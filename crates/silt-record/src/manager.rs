//! Record-file lifecycle: create, open, close, destroy.
//!
//! The header page (page 0) is read and written straight through the
//! disk manager, never through the buffer pool, so the data-page bound
//! `page_no >= 1` holds everywhere above.

use std::path::Path;
use std::sync::Arc;

use silt_error::{Result, SiltError};
use silt_storage::{BufferPoolManager, DiskManager};
use silt_types::PAGE_SIZE;

use crate::file_handle::RmFileHandle;
use crate::layout::RmFileHdr;

/// Creates and opens record files.
pub struct RmManager {
    disk: Arc<DiskManager>,
    buffer_pool: BufferPoolManager,
}

impl RmManager {
    #[must_use]
    pub fn new(disk: Arc<DiskManager>, buffer_pool: BufferPoolManager) -> Self {
        Self { disk, buffer_pool }
    }

    /// Create a record file for fixed-size records of `record_size`
    /// bytes and persist its header to page 0.
    pub fn create_file(&self, path: &Path, record_size: i32) -> Result<()> {
        let hdr = RmFileHdr::for_record_size(record_size)?;
        self.disk.create_file(path)?;
        let fd = self.disk.open_file(path)?;

        let mut page = vec![0_u8; PAGE_SIZE];
        hdr.encode(&mut page);
        self.disk.write_page(fd, 0, &page)?;
        self.disk.close_file(fd)?;
        tracing::debug!(path = %path.display(), record_size, "created record file");
        Ok(())
    }

    /// Open a record file and hand back a handle over it.
    pub fn open_file(&self, path: &Path) -> Result<RmFileHandle> {
        let fd = self.disk.open_file(path)?;
        let mut page = vec![0_u8; PAGE_SIZE];
        if let Err(err) = self.disk.read_page(fd, 0, &mut page) {
            self.disk.close_file(fd)?;
            return Err(err);
        }
        let hdr = RmFileHdr::decode(&page);
        if !hdr.is_well_formed() {
            self.disk.close_file(fd)?;
            return Err(SiltError::NotARecordFile {
                path: path.to_path_buf(),
            });
        }
        // The header is the authority on how many pages exist; the disk
        // manager's counter must continue from it.
        self.disk.set_next_page_no(fd, hdr.num_pages)?;
        Ok(RmFileHandle::new(
            fd,
            hdr,
            Arc::clone(&self.disk),
            self.buffer_pool.clone(),
        ))
    }

    /// Close a record file: persist the in-memory header to page 0,
    /// flush and evict its data pages, drop the descriptor.
    pub fn close_file(&self, file_handle: RmFileHandle) -> Result<()> {
        let fd = file_handle.fd();
        let mut page = vec![0_u8; PAGE_SIZE];
        file_handle.file_hdr().encode(&mut page);
        self.disk.write_page(fd, 0, &page)?;
        self.buffer_pool.flush_all_pages(fd)?;
        self.buffer_pool.evict_file_pages(fd)?;
        self.disk.close_file(fd)
    }

    /// Remove a record file from disk. Fails while the file is open.
    pub fn destroy_file(&self, path: &Path) -> Result<()> {
        self.disk.destroy_file(path)
    }
}
