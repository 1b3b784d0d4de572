//! On-disk layout of a record file.
//!
//! Page 0 persists the file header. Every data page (`page_no >= 1`)
//! holds three regions in order: the page header, the slot bitmap, and
//! the slot array. Fields are encoded little-endian with bounds-checked
//! slice reads; files are not portable across layout revisions.

use silt_error::{Result, SiltError};
use silt_types::{NO_PAGE, PAGE_SIZE};

/// Bytes occupied by [`RmPageHdr`] at the start of each data page.
pub const PAGE_HDR_SIZE: usize = 8;

/// Bytes occupied by [`RmFileHdr`] at the start of page 0.
pub const FILE_HDR_SIZE: usize = 20;

/// File header, persisted at page 0.
///
/// `record_size` is fixed for the lifetime of the file;
/// `num_records_per_page` and `bitmap_size` are derived from it and
/// stored for direct use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmFileHdr {
    /// Bytes per record payload.
    pub record_size: i32,
    /// Total pages allocated, including the header page.
    pub num_pages: i32,
    /// Slots per data page.
    pub num_records_per_page: i32,
    /// Bytes of slot bitmap on each data page.
    pub bitmap_size: i32,
    /// Head of the free-page list, or [`NO_PAGE`].
    pub first_free_page_no: i32,
}

impl RmFileHdr {
    /// Build the header of a fresh file for the given record size.
    ///
    /// Packs as many slots per page as the bitmap overhead allows:
    /// each record costs `record_size` bytes plus one bitmap bit.
    pub fn for_record_size(record_size: i32) -> Result<Self> {
        let avail = 8 * (PAGE_SIZE - PAGE_HDR_SIZE);
        let num_records_per_page = if record_size <= 0 {
            0
        } else {
            avail / (1 + 8 * record_size as usize)
        };
        if num_records_per_page == 0 {
            return Err(SiltError::internal(format!(
                "record size {record_size} does not fit a {PAGE_SIZE}-byte page"
            )));
        }
        let bitmap_size = num_records_per_page.div_ceil(8);
        Ok(Self {
            record_size,
            num_pages: 1,
            num_records_per_page: num_records_per_page as i32,
            bitmap_size: bitmap_size as i32,
            first_free_page_no: NO_PAGE,
        })
    }

    /// Whether the stored fields are mutually consistent, i.e. whether
    /// this header could have been produced by [`Self::for_record_size`].
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        if self.record_size <= 0 || self.num_pages < 1 || self.first_free_page_no < NO_PAGE {
            return false;
        }
        match Self::for_record_size(self.record_size) {
            Ok(fresh) => {
                fresh.num_records_per_page == self.num_records_per_page
                    && fresh.bitmap_size == self.bitmap_size
            }
            Err(_) => false,
        }
    }

    /// Byte range of the slot bitmap within a data page.
    #[inline]
    #[must_use]
    pub fn bitmap_range(&self) -> std::ops::Range<usize> {
        PAGE_HDR_SIZE..PAGE_HDR_SIZE + self.bitmap_size as usize
    }

    /// Byte range of slot `slot_no` within a data page.
    #[inline]
    #[must_use]
    pub fn slot_range(&self, slot_no: usize) -> std::ops::Range<usize> {
        let start =
            PAGE_HDR_SIZE + self.bitmap_size as usize + slot_no * self.record_size as usize;
        start..start + self.record_size as usize
    }

    /// Encode into the front of a header-page buffer.
    pub fn encode(&self, page: &mut [u8]) {
        page[0..4].copy_from_slice(&self.record_size.to_le_bytes());
        page[4..8].copy_from_slice(&self.num_pages.to_le_bytes());
        page[8..12].copy_from_slice(&self.num_records_per_page.to_le_bytes());
        page[12..16].copy_from_slice(&self.bitmap_size.to_le_bytes());
        page[16..20].copy_from_slice(&self.first_free_page_no.to_le_bytes());
    }

    /// Decode from the front of a header-page buffer.
    #[must_use]
    pub fn decode(page: &[u8]) -> Self {
        Self {
            record_size: read_i32(page, 0),
            num_pages: read_i32(page, 4),
            num_records_per_page: read_i32(page, 8),
            bitmap_size: read_i32(page, 12),
            first_free_page_no: read_i32(page, 16),
        }
    }
}

/// Data-page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmPageHdr {
    /// Live records on this page.
    pub num_records: i32,
    /// Next page on the free list, or [`NO_PAGE`].
    ///
    /// [`NO_PAGE`] for a page that is full (off the list) or at the
    /// list's tail.
    pub next_free_page_no: i32,
}

impl RmPageHdr {
    pub fn encode(&self, page: &mut [u8]) {
        page[0..4].copy_from_slice(&self.num_records.to_le_bytes());
        page[4..8].copy_from_slice(&self.next_free_page_no.to_le_bytes());
    }

    #[must_use]
    pub fn decode(page: &[u8]) -> Self {
        Self {
            num_records: read_i32(page, 0),
            next_free_page_no: read_i32(page, 4),
        }
    }
}

#[inline]
fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
