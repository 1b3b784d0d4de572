//! Scoped guard over a pinned page.
//!
//! Obtaining a [`PageGuard`] implies the page is pinned in the buffer
//! pool; dropping it performs the unpin. The dirty flag travels with the
//! guard: taking a mutable view of the page bytes marks it, and the drop
//! hands it to the pool so write-back happens on eviction. This makes
//! the "forgot to unpin on an error path" bug unrepresentable.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use silt_types::PageId;

use crate::buffer_pool::BufferPoolManager;

/// Shared handle to a frame's byte buffer.
pub(crate) type FrameData = Arc<RwLock<Box<[u8]>>>;

/// A pinned page. Dropping the guard unpins it.
pub struct PageGuard {
    pool: BufferPoolManager,
    page_id: PageId,
    frame: FrameData,
    dirty: bool,
}

impl PageGuard {
    pub(crate) fn new(pool: BufferPoolManager, page_id: PageId, frame: FrameData) -> Self {
        Self {
            pool,
            page_id,
            frame,
            dirty: false,
        }
    }

    /// The identity of the pinned page.
    #[inline]
    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Read-only view of the page bytes.
    ///
    /// The latch is held only for the lifetime of the returned guard,
    /// not for the lifetime of the pin; concurrent pins of the same page
    /// never block each other across accesses.
    #[inline]
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.frame.read()
    }

    /// Mutable view of the page bytes. Marks the page dirty.
    #[inline]
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.dirty = true;
        self.frame.write()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}

impl std::fmt::Debug for PageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("dirty", &self.dirty)
            .finish()
    }
}
