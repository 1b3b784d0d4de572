//! Buffer pool manager: a fixed array of page frames shared by every
//! open file, with pin counts, dirty tracking, and LRU replacement.
//!
//! The manager is a cheap-to-clone handle over shared state; guards
//! carry their own handle so unpinning never needs a lifetime back to
//! the caller. A single mutex guards the mapping state (page table, pin
//! counts, replacer); the page bytes themselves live behind per-frame
//! `RwLock`s so pins of unrelated pages never serialise on each other's
//! I/O.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use silt_error::{Result, SiltError};
use silt_types::{FileId, PageId, PAGE_SIZE};

use crate::disk::DiskManager;
use crate::page::{FrameData, PageGuard};
use crate::replacer::{FrameId, LruReplacer};

#[derive(Debug, Clone, Copy, Default)]
struct FrameMeta {
    page_id: Option<PageId>,
    pin_count: u32,
    dirty: bool,
}

#[derive(Default)]
struct PoolState {
    metas: Vec<FrameMeta>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: LruReplacer,
}

struct PoolShared {
    disk: Arc<DiskManager>,
    frames: Vec<FrameData>,
    state: Mutex<PoolState>,
}

/// Fixed-capacity buffer pool over the disk manager.
///
/// Clones share the same frames and page table.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<PoolShared>,
}

impl BufferPoolManager {
    /// Create a pool with `pool_size` frames.
    #[must_use]
    pub fn new(pool_size: usize, disk: Arc<DiskManager>) -> Self {
        let frames = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(vec![0_u8; PAGE_SIZE].into_boxed_slice())))
            .collect();
        let state = PoolState {
            metas: vec![FrameMeta::default(); pool_size],
            free_list: (0..pool_size).rev().collect(),
            ..PoolState::default()
        };
        Self {
            inner: Arc::new(PoolShared {
                disk,
                frames,
                state: Mutex::new(state),
            }),
        }
    }

    /// The disk manager this pool reads and writes through.
    #[must_use]
    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.inner.disk
    }

    /// Pin a page, reading it from disk if it is not resident.
    ///
    /// Returns `Ok(None)` when every frame is pinned and no victim can
    /// be found; callers translate that into their own error.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<PageGuard>> {
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        if let Some(&frame) = state.page_table.get(&page_id) {
            state.metas[frame].pin_count += 1;
            state.replacer.pin(frame);
            drop(state);
            return Ok(Some(PageGuard::new(
                self.clone(),
                page_id,
                Arc::clone(&inner.frames[frame]),
            )));
        }

        let Some(frame) = Self::acquire_frame(inner, &mut state)? else {
            return Ok(None);
        };
        {
            let mut data = inner.frames[frame].write();
            if let Err(err) = inner.disk.read_page(page_id.fd, page_id.page_no, &mut data) {
                drop(data);
                state.free_list.push(frame);
                return Err(err);
            }
        }
        state.metas[frame] = FrameMeta {
            page_id: Some(page_id),
            pin_count: 1,
            dirty: false,
        };
        state.page_table.insert(page_id, frame);
        drop(state);
        Ok(Some(PageGuard::new(
            self.clone(),
            page_id,
            Arc::clone(&inner.frames[frame]),
        )))
    }

    /// Allocate and pin a fresh zero-filled page of `fd`.
    ///
    /// The page number comes from the disk manager's per-file counter.
    /// The frame starts dirty so the page reaches disk even if the
    /// caller writes nothing into it.
    pub fn new_page(&self, fd: FileId) -> Result<Option<PageGuard>> {
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        let Some(frame) = Self::acquire_frame(inner, &mut state)? else {
            return Ok(None);
        };
        let page_no = match inner.disk.allocate_page(fd) {
            Ok(n) => n,
            Err(err) => {
                state.free_list.push(frame);
                return Err(err);
            }
        };
        let page_id = PageId::new(fd, page_no);
        inner.frames[frame].write().fill(0);
        state.metas[frame] = FrameMeta {
            page_id: Some(page_id),
            pin_count: 1,
            dirty: true,
        };
        state.page_table.insert(page_id, frame);
        drop(state);
        tracing::debug!(%page_id, "allocated new page");
        Ok(Some(PageGuard::new(
            self.clone(),
            page_id,
            Arc::clone(&inner.frames[frame]),
        )))
    }

    /// Drop one pin on a page. Invoked from [`PageGuard::drop`].
    ///
    /// Returns `false` if the page is not resident or not pinned.
    pub(crate) fn unpin_page(&self, page_id: PageId, dirty: bool) -> bool {
        let mut state = self.inner.state.lock();
        let Some(&frame) = state.page_table.get(&page_id) else {
            return false;
        };
        let meta = &mut state.metas[frame];
        if meta.pin_count == 0 {
            return false;
        }
        meta.pin_count -= 1;
        meta.dirty |= dirty;
        if meta.pin_count == 0 {
            state.replacer.unpin(frame);
        }
        true
    }

    /// Write a resident page back to disk, clearing its dirty flag.
    ///
    /// Returns `false` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        let Some(&frame) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        let data = inner.frames[frame].read();
        inner.disk.write_page(page_id.fd, page_id.page_no, &data)?;
        drop(data);
        state.metas[frame].dirty = false;
        Ok(true)
    }

    /// Write every resident page of `fd` back to disk.
    pub fn flush_all_pages(&self, fd: FileId) -> Result<()> {
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        let frames: Vec<FrameId> = state
            .page_table
            .iter()
            .filter(|(pid, _)| pid.fd == fd)
            .map(|(_, &frame)| frame)
            .collect();
        for frame in frames {
            let page_id = state.metas[frame]
                .page_id
                .expect("mapped frame has a page id");
            let data = inner.frames[frame].read();
            inner.disk.write_page(page_id.fd, page_id.page_no, &data)?;
            drop(data);
            state.metas[frame].dirty = false;
        }
        Ok(())
    }

    /// Drop every resident page of `fd` from the pool.
    ///
    /// Pages must be unpinned and flushed first; a pinned page is an
    /// invariant violation reported as [`SiltError::Internal`].
    pub fn evict_file_pages(&self, fd: FileId) -> Result<()> {
        let mut state = self.inner.state.lock();
        let pages: Vec<(PageId, FrameId)> = state
            .page_table
            .iter()
            .filter(|(pid, _)| pid.fd == fd)
            .map(|(&pid, &frame)| (pid, frame))
            .collect();
        for (page_id, frame) in pages {
            if state.metas[frame].pin_count > 0 {
                return Err(SiltError::internal(format!(
                    "page {page_id} is still pinned while its file is being closed"
                )));
            }
            state.page_table.remove(&page_id);
            state.replacer.pin(frame);
            state.metas[frame] = FrameMeta::default();
            state.free_list.push(frame);
        }
        Ok(())
    }

    /// Take a free frame, evicting a victim (with dirty write-back) if
    /// necessary. `None` means every frame is pinned.
    fn acquire_frame(inner: &PoolShared, state: &mut PoolState) -> Result<Option<FrameId>> {
        if let Some(frame) = state.free_list.pop() {
            return Ok(Some(frame));
        }
        let Some(frame) = state.replacer.victim() else {
            return Ok(None);
        };
        let meta = state.metas[frame];
        if let Some(old) = meta.page_id {
            if meta.dirty {
                let data = inner.frames[frame].read();
                if let Err(err) = inner.disk.write_page(old.fd, old.page_no, &data) {
                    drop(data);
                    state.replacer.unpin(frame);
                    return Err(err);
                }
            }
            tracing::debug!(page_id = %old, dirty = meta.dirty, "evicted page");
            state.page_table.remove(&old);
        }
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(pool_size: usize) -> (TempDir, Arc<DiskManager>, BufferPoolManager, FileId) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new());
        let path = dir.path().join("pool.db");
        disk.create_file(&path).unwrap();
        let fd = disk.open_file(&path).unwrap();
        let pool = BufferPoolManager::new(pool_size, Arc::clone(&disk));
        (dir, disk, pool, fd)
    }

    #[test]
    fn test_new_page_then_fetch_sees_writes() {
        let (_dir, _disk, pool, fd) = setup(4);
        let page_no = {
            let mut page = pool.new_page(fd).unwrap().unwrap();
            page.data_mut()[0..4].copy_from_slice(b"silt");
            page.page_id().page_no
        };
        let page = pool.fetch_page(PageId::new(fd, page_no)).unwrap().unwrap();
        assert_eq!(&page.data()[0..4], b"silt");
    }

    #[test]
    fn test_guard_drop_unpins() {
        let (_dir, _disk, pool, fd) = setup(4);
        let page_id = {
            let page = pool.new_page(fd).unwrap().unwrap();
            page.page_id()
        };
        let state = pool.inner.state.lock();
        let frame = state.page_table[&page_id];
        assert_eq!(state.metas[frame].pin_count, 0);
        assert!(state.metas[frame].dirty, "new pages start dirty");
    }

    #[test]
    fn test_all_pinned_returns_none() {
        let (_dir, _disk, pool, fd) = setup(2);
        let _a = pool.new_page(fd).unwrap().unwrap();
        let _b = pool.new_page(fd).unwrap().unwrap();
        assert!(pool.new_page(fd).unwrap().is_none());
        assert!(pool.fetch_page(PageId::new(fd, 99)).unwrap().is_none());
    }

    #[test]
    fn test_eviction_writes_dirty_page_back() {
        let (_dir, disk, pool, fd) = setup(1);
        let page_no = {
            let mut page = pool.new_page(fd).unwrap().unwrap();
            page.data_mut().fill(0xCD);
            page.page_id().page_no
        };
        // The single frame is reused for a second page, forcing the
        // first page out through the dirty write-back path.
        let _other = pool.new_page(fd).unwrap().unwrap();

        let mut out = vec![0_u8; PAGE_SIZE];
        disk.read_page(fd, page_no, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xCD));
    }

    #[test]
    fn test_fetch_reloads_evicted_page() {
        let (_dir, _disk, pool, fd) = setup(1);
        let first = {
            let mut page = pool.new_page(fd).unwrap().unwrap();
            page.data_mut()[0] = 0x5A;
            page.page_id()
        };
        {
            let _second = pool.new_page(fd).unwrap().unwrap();
        }
        let page = pool.fetch_page(first).unwrap().unwrap();
        assert_eq!(page.data()[0], 0x5A);
    }

    #[test]
    fn test_repeated_pins_of_one_page_share_a_frame() {
        let (_dir, _disk, pool, fd) = setup(4);
        let page_id = {
            let page = pool.new_page(fd).unwrap().unwrap();
            page.page_id()
        };
        let a = pool.fetch_page(page_id).unwrap().unwrap();
        let b = pool.fetch_page(page_id).unwrap().unwrap();
        {
            let state = pool.inner.state.lock();
            let frame = state.page_table[&page_id];
            assert_eq!(state.metas[frame].pin_count, 2);
        }
        drop(a);
        drop(b);
        let state = pool.inner.state.lock();
        let frame = state.page_table[&page_id];
        assert_eq!(state.metas[frame].pin_count, 0);
    }

    #[test]
    fn test_flush_and_evict_file_pages() {
        let (_dir, disk, pool, fd) = setup(4);
        let page_no = {
            let mut page = pool.new_page(fd).unwrap().unwrap();
            page.data_mut()[7] = 0x77;
            page.page_id().page_no
        };
        pool.flush_all_pages(fd).unwrap();
        let mut out = vec![0_u8; PAGE_SIZE];
        disk.read_page(fd, page_no, &mut out).unwrap();
        assert_eq!(out[7], 0x77);

        pool.evict_file_pages(fd).unwrap();
        assert!(pool.inner.state.lock().page_table.is_empty());
    }

    #[test]
    fn test_evict_pinned_page_is_an_error() {
        let (_dir, _disk, pool, fd) = setup(4);
        let _page = pool.new_page(fd).unwrap().unwrap();
        assert!(matches!(
            pool.evict_file_pages(fd),
            Err(SiltError::Internal(_))
        ));
    }

    #[test]
    fn test_explicit_flush_page() {
        let (_dir, disk, pool, fd) = setup(4);
        let page_id = {
            let mut page = pool.new_page(fd).unwrap().unwrap();
            page.data_mut()[0] = 0x11;
            page.page_id()
        };
        assert!(pool.flush_page(page_id).unwrap());
        let mut out = vec![0_u8; PAGE_SIZE];
        disk.read_page(fd, page_id.page_no, &mut out).unwrap();
        assert_eq!(out[0], 0x11);
        assert!(!pool.flush_page(PageId::new(fd, 42)).unwrap());
    }
}
