//! Core identifier types and page constants.
//!
//! Everything here is a small `Copy` value: record identifiers, file and
//! page ids, transaction ids and timestamps. Page numbers and slot
//! numbers are `i32` with `-1` (`NO_PAGE`) as the "none" sentinel, which
//! doubles as the free-list terminator and the scan end marker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of every page in a paged file, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel page/slot number meaning "none".
///
/// Used as the free-list terminator, the scan end marker, and inside
/// [`Rid::NONE`].
pub const NO_PAGE: i32 = -1;

/// First data page of a record file. Page 0 holds the file header.
pub const FIRST_RECORD_PAGE: i32 = 1;

/// Engine-level handle to an open paged file.
///
/// Assigned by the disk manager when a file is opened; not an OS file
/// descriptor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct FileId(u32);

impl FileId {
    /// Create a file id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A page within a specific open file.
///
/// The unit the buffer pool keys its page table on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub fd: FileId,
    pub page_no: i32,
}

impl PageId {
    #[inline]
    #[must_use]
    pub const fn new(fd: FileId, page_no: i32) -> Self {
        Self { fd, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fd, self.page_no)
    }
}

/// Record identifier: the location of a record inside one record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Rid {
    /// The "no record" sentinel, also the scan end marker.
    pub const NONE: Self = Self {
        page_no: NO_PAGE,
        slot_no: NO_PAGE,
    };

    #[inline]
    #[must_use]
    pub const fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot_no)
    }
}

/// Monotonic transaction identifier, assigned at transaction creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic engine timestamp, assigned when a transaction begins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
