//! CRUD over record identifiers, plus free-page list maintenance.
//!
//! Every operation fetches exactly the pages it needs through the
//! buffer pool; the returned [`RmPageHandle`]s unpin on drop, dirty iff
//! a mutating accessor was used, so every exit path (the error returns
//! included) releases its pins.
//!
//! Mutating operations take `&mut self` because they update the
//! in-memory file header (free-list head, page count). The handle holds
//! no internal mutex; concurrent use of one heap file relies on
//! caller-level locking at record/table granularity.

use std::sync::Arc;

use silt_error::{Result, SiltError};
use silt_storage::{BufferPoolManager, DiskManager};
use silt_types::{FileId, PageId, Rid, FIRST_RECORD_PAGE, NO_PAGE};

use crate::layout::RmFileHdr;
use crate::page_handle::RmPageHandle;
use crate::record::Record;

/// Handle to one open record file.
pub struct RmFileHandle {
    fd: FileId,
    file_hdr: RmFileHdr,
    disk: Arc<DiskManager>,
    buffer_pool: BufferPoolManager,
}

impl RmFileHandle {
    pub(crate) fn new(
        fd: FileId,
        file_hdr: RmFileHdr,
        disk: Arc<DiskManager>,
        buffer_pool: BufferPoolManager,
    ) -> Self {
        Self {
            fd,
            file_hdr,
            disk,
            buffer_pool,
        }
    }

    /// The disk manager's id for this file.
    #[inline]
    #[must_use]
    pub fn fd(&self) -> FileId {
        self.fd
    }

    /// The in-memory file header. Persisted back to page 0 on close.
    #[inline]
    #[must_use]
    pub fn file_hdr(&self) -> &RmFileHdr {
        &self.file_hdr
    }

    /// Copy the record at `rid` out of its page.
    pub fn get_record(&self, rid: Rid) -> Result<Record> {
        let page_handle = self.fetch_page_handle(rid.page_no)?;
        let slot_no = self.slot_index(rid)?;
        if !page_handle.is_slot_set(slot_no) {
            return Err(record_not_found(rid));
        }
        Ok(Record::new(page_handle.read_slot(slot_no)))
    }

    /// Insert a record wherever there is room, returning its location.
    ///
    /// The target page is the head of the free list (allocating a new
    /// page if the list is empty); a page that becomes full is spliced
    /// off the list head.
    pub fn insert_record(&mut self, buf: &[u8]) -> Result<Rid> {
        self.check_record_len(buf)?;
        let mut page_handle = self.create_page_handle()?;
        let page_no = page_handle.page_no();

        let Some(slot_no) = page_handle.first_free_slot() else {
            return Err(SiltError::internal(format!(
                "page {page_no} is on the free list but has no free slot"
            )));
        };
        page_handle.write_slot(slot_no, buf);
        page_handle.set_slot_bit(slot_no);

        let mut page_hdr = page_handle.page_hdr();
        page_hdr.num_records += 1;
        if page_hdr.num_records == self.file_hdr.num_records_per_page {
            // A page served by create_page_handle is always the list
            // head, so splicing it out is a head update.
            self.file_hdr.first_free_page_no = page_hdr.next_free_page_no;
            page_hdr.next_free_page_no = NO_PAGE;
        }
        page_handle.set_page_hdr(page_hdr);

        Ok(Rid::new(page_no, slot_no as i32))
    }

    /// Insert a record at an exact location.
    ///
    /// Used by transaction abort to undo a delete at the record's
    /// original identifier. Fails with `RecordNotFound` if the slot is
    /// already occupied.
    pub fn insert_record_at(&mut self, rid: Rid, buf: &[u8]) -> Result<()> {
        self.check_record_len(buf)?;
        let mut page_handle = self.fetch_page_handle(rid.page_no)?;
        let slot_no = self.slot_index(rid)?;
        if page_handle.is_slot_set(slot_no) {
            return Err(record_not_found(rid));
        }
        page_handle.write_slot(slot_no, buf);
        page_handle.set_slot_bit(slot_no);

        let mut page_hdr = page_handle.page_hdr();
        page_hdr.num_records += 1;
        if page_hdr.num_records == self.file_hdr.num_records_per_page {
            // The page may sit anywhere on the free list; unlink it.
            self.unlink_free_page(rid.page_no, page_hdr.next_free_page_no)?;
            page_hdr.next_free_page_no = NO_PAGE;
        }
        page_handle.set_page_hdr(page_hdr);
        Ok(())
    }

    /// Delete the record at `rid`.
    ///
    /// A page that was full re-enters the free list at its head.
    pub fn delete_record(&mut self, rid: Rid) -> Result<()> {
        let mut page_handle = self.fetch_page_handle(rid.page_no)?;
        let slot_no = self.slot_index(rid)?;
        if !page_handle.is_slot_set(slot_no) {
            return Err(record_not_found(rid));
        }
        let mut page_hdr = page_handle.page_hdr();
        let was_full = page_hdr.num_records == self.file_hdr.num_records_per_page;
        page_handle.clear_slot_bit(slot_no);
        page_hdr.num_records -= 1;
        if was_full {
            page_hdr.next_free_page_no = self.file_hdr.first_free_page_no;
            self.file_hdr.first_free_page_no = rid.page_no;
        }
        page_handle.set_page_hdr(page_hdr);
        Ok(())
    }

    /// Overwrite the record at `rid`. Bitmap and counts are untouched.
    pub fn update_record(&mut self, rid: Rid, buf: &[u8]) -> Result<()> {
        self.check_record_len(buf)?;
        let mut page_handle = self.fetch_page_handle(rid.page_no)?;
        let slot_no = self.slot_index(rid)?;
        if !page_handle.is_slot_set(slot_no) {
            return Err(record_not_found(rid));
        }
        page_handle.write_slot(slot_no, buf);
        Ok(())
    }

    /// Pin the data page `page_no` and wrap it in a typed handle.
    pub fn fetch_page_handle(&self, page_no: i32) -> Result<RmPageHandle> {
        if page_no < FIRST_RECORD_PAGE || page_no >= self.file_hdr.num_pages {
            return Err(self.page_not_exist(page_no));
        }
        let page = self
            .buffer_pool
            .fetch_page(PageId::new(self.fd, page_no))?
            .ok_or_else(|| self.page_not_exist(page_no))?;
        Ok(RmPageHandle::new(self.file_hdr, page))
    }

    /// Return a pinned page with at least one free slot: the free-list
    /// head if the list is non-empty, a freshly allocated page
    /// otherwise.
    pub fn create_page_handle(&mut self) -> Result<RmPageHandle> {
        if self.file_hdr.first_free_page_no == NO_PAGE {
            return self.create_new_page_handle();
        }
        self.fetch_page_handle(self.file_hdr.first_free_page_no)
    }

    /// Allocate a new data page, initialise it, and push it onto the
    /// free list head.
    fn create_new_page_handle(&mut self) -> Result<RmPageHandle> {
        let Some(page) = self.buffer_pool.new_page(self.fd)? else {
            return Err(SiltError::internal(
                "buffer pool has no free frame for a new record page",
            ));
        };
        let page_no = page.page_id().page_no;
        tracing::debug!(fd = %self.fd, page_no, "allocated record page");

        let mut page_handle = RmPageHandle::new(self.file_hdr, page);
        page_handle.init(self.file_hdr.first_free_page_no);
        self.file_hdr.first_free_page_no = page_no;
        self.file_hdr.num_pages += 1;

        // Unpin the freshly written page, then hand the caller an
        // ordinary pinned handle to it.
        drop(page_handle);
        self.fetch_page_handle(page_no)
    }

    /// Unlink `target` (about to become full) from the free list, given
    /// the value of its own `next_free_page_no`.
    fn unlink_free_page(&mut self, target: i32, target_next: i32) -> Result<()> {
        if self.file_hdr.first_free_page_no == target {
            self.file_hdr.first_free_page_no = target_next;
            return Ok(());
        }
        let mut prev = self.file_hdr.first_free_page_no;
        while prev != NO_PAGE {
            let mut prev_handle = self.fetch_page_handle(prev)?;
            let mut prev_hdr = prev_handle.page_hdr();
            if prev_hdr.next_free_page_no == target {
                prev_hdr.next_free_page_no = target_next;
                prev_handle.set_page_hdr(prev_hdr);
                return Ok(());
            }
            prev = prev_hdr.next_free_page_no;
        }
        // Invariant 1 says a non-full page is always on the list; not
        // finding it means the list is corrupt.
        Err(SiltError::internal(format!(
            "page {target} filled up but was not on the free list"
        )))
    }

    fn slot_index(&self, rid: Rid) -> Result<usize> {
        if rid.slot_no < 0 || rid.slot_no >= self.file_hdr.num_records_per_page {
            return Err(record_not_found(rid));
        }
        Ok(rid.slot_no as usize)
    }

    fn check_record_len(&self, buf: &[u8]) -> Result<()> {
        if buf.len() != self.file_hdr.record_size as usize {
            return Err(SiltError::RecordSizeMismatch {
                expected: self.file_hdr.record_size as usize,
                actual: buf.len(),
            });
        }
        Ok(())
    }

    fn page_not_exist(&self, page_no: i32) -> SiltError {
        SiltError::PageNotExist {
            file: self
                .disk
                .get_file_name(self.fd)
                .unwrap_or_else(|_| format!("<fd {}>", self.fd)),
            page_no,
        }
    }
}

impl std::fmt::Debug for RmFileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmFileHandle")
            .field("fd", &self.fd)
            .field("file_hdr", &self.file_hdr)
            .finish()
    }
}

fn record_not_found(rid: Rid) -> SiltError {
    SiltError::RecordNotFound {
        page_no: rid.page_no,
        slot_no: rid.slot_no,
    }
}
