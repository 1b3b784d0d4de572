//! Forward scan over the live records of one file.
//!
//! Single-pass and not restartable. Construction positions the scan on
//! the first live record; [`RmScan::next`] advances strictly past the
//! last returned position. The end state is the [`Rid::NONE`] sentinel.

use silt_error::Result;
use silt_types::{Rid, FIRST_RECORD_PAGE, NO_PAGE};

use crate::file_handle::RmFileHandle;

/// Forward scan iterator, in record-identifier order.
pub struct RmScan<'a> {
    file_handle: &'a RmFileHandle,
    rid: Rid,
}

impl<'a> RmScan<'a> {
    /// Open a scan positioned at the first live record, or at the end
    /// sentinel if the file has none.
    pub fn new(file_handle: &'a RmFileHandle) -> Result<Self> {
        let mut scan = Self {
            file_handle,
            rid: Rid::new(FIRST_RECORD_PAGE, -1),
        };
        scan.next()?;
        Ok(scan)
    }

    /// Advance to the next live record strictly after the current
    /// position. Past the last record the scan enters the end state and
    /// stays there.
    pub fn next(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        let hdr = self.file_handle.file_hdr();
        if hdr.num_pages <= FIRST_RECORD_PAGE {
            self.rid = Rid::NONE;
            return Ok(());
        }
        let start_page = self.rid.page_no;
        let start_slot = self.rid.slot_no;
        for page_no in start_page..hdr.num_pages {
            let page_handle = self.file_handle.fetch_page_handle(page_no)?;
            let from = if page_no == start_page {
                (start_slot + 1) as usize
            } else {
                0
            };
            if let Some(slot_no) = page_handle.next_set_slot(from) {
                self.rid = Rid::new(page_no, slot_no as i32);
                return Ok(());
            }
        }
        self.rid = Rid::NONE;
        Ok(())
    }

    /// The scan's current position: the last record returned, or the
    /// end sentinel.
    #[inline]
    #[must_use]
    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// Whether the scan has run off the end of the file.
    #[inline]
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.rid.page_no == NO_PAGE
    }
}
