//! Typed view over one pinned data page.
//!
//! Bundles the pinned page with the owning file's layout so callers can
//! address the page header, the slot bitmap, and individual slots
//! without repeating offset arithmetic. Dropping the handle unpins the
//! page; any mutating accessor marks it dirty.

use silt_storage::PageGuard;

use crate::bitmap;
use crate::layout::{RmFileHdr, RmPageHdr};

/// A pinned data page of a record file.
pub struct RmPageHandle {
    hdr: RmFileHdr,
    page: PageGuard,
}

impl RmPageHandle {
    pub(crate) fn new(hdr: RmFileHdr, page: PageGuard) -> Self {
        Self { hdr, page }
    }

    /// Page number of the pinned page.
    #[inline]
    #[must_use]
    pub fn page_no(&self) -> i32 {
        self.page.page_id().page_no
    }

    /// Decode the page header.
    #[must_use]
    pub fn page_hdr(&self) -> RmPageHdr {
        RmPageHdr::decode(&self.page.data())
    }

    /// Overwrite the page header.
    pub fn set_page_hdr(&mut self, hdr: RmPageHdr) {
        hdr.encode(&mut self.page.data_mut());
    }

    /// Whether slot `slot_no` holds a live record.
    #[must_use]
    pub fn is_slot_set(&self, slot_no: usize) -> bool {
        bitmap::is_set(&self.page.data()[self.hdr.bitmap_range()], slot_no)
    }

    /// Mark slot `slot_no` live.
    pub fn set_slot_bit(&mut self, slot_no: usize) {
        let range = self.hdr.bitmap_range();
        bitmap::set(&mut self.page.data_mut()[range], slot_no);
    }

    /// Mark slot `slot_no` free.
    pub fn clear_slot_bit(&mut self, slot_no: usize) {
        let range = self.hdr.bitmap_range();
        bitmap::clear(&mut self.page.data_mut()[range], slot_no);
    }

    /// First free slot on this page, if any.
    #[must_use]
    pub fn first_free_slot(&self) -> Option<usize> {
        bitmap::first_clear(
            &self.page.data()[self.hdr.bitmap_range()],
            self.hdr.num_records_per_page as usize,
        )
    }

    /// First live slot at index `>= from`, if any.
    #[must_use]
    pub fn next_set_slot(&self, from: usize) -> Option<usize> {
        bitmap::next_set(
            &self.page.data()[self.hdr.bitmap_range()],
            self.hdr.num_records_per_page as usize,
            from,
        )
    }

    /// Live records on this page, counted from the bitmap.
    #[must_use]
    pub fn count_records(&self) -> usize {
        bitmap::count_ones(
            &self.page.data()[self.hdr.bitmap_range()],
            self.hdr.num_records_per_page as usize,
        )
    }

    /// Copy the payload of slot `slot_no` into a fresh buffer.
    #[must_use]
    pub fn read_slot(&self, slot_no: usize) -> Vec<u8> {
        self.page.data()[self.hdr.slot_range(slot_no)].to_vec()
    }

    /// Copy `record_size` bytes of `buf` into slot `slot_no`.
    pub fn write_slot(&mut self, slot_no: usize, buf: &[u8]) {
        let range = self.hdr.slot_range(slot_no);
        let len = range.len();
        self.page.data_mut()[range].copy_from_slice(&buf[..len]);
    }

    /// Initialise a freshly allocated page: empty header pointing at
    /// `next_free_page_no`, all-zero bitmap.
    pub(crate) fn init(&mut self, next_free_page_no: i32) {
        self.set_page_hdr(RmPageHdr {
            num_records: 0,
            next_free_page_no,
        });
        let range = self.hdr.bitmap_range();
        bitmap::init(&mut self.page.data_mut()[range]);
    }
}

impl std::fmt::Debug for RmPageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmPageHandle")
            .field("page_no", &self.page_no())
            .field("page_hdr", &self.page_hdr())
            .finish()
    }
}
