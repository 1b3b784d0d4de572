//! Error types for the silt storage engine.
//!
//! A single enum covers every layer (disk, buffer pool, record manager,
//! lock manager, transaction manager): structured variants for the cases
//! callers are expected to match on, a catch-all `Internal` for invariant
//! violations that should never happen.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for silt operations.
#[derive(Error, Debug)]
pub enum SiltError {
    // === File errors ===
    /// File does not exist on disk.
    #[error("file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// File already exists on disk.
    #[error("file already exists: '{path}'")]
    FileExists { path: PathBuf },

    /// File is currently open and the operation requires it closed.
    #[error("file is in use: '{path}'")]
    FileInUse { path: PathBuf },

    /// No open file is registered under this id.
    #[error("unknown file id {fd}")]
    UnknownFile { fd: u32 },

    /// The file's header page does not describe a record file.
    #[error("file is not a record file: '{path}'")]
    NotARecordFile { path: PathBuf },

    // === I/O errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Record manager errors ===
    /// Page number out of range for the file, or the buffer pool could
    /// not serve the page.
    #[error("page {page_no} does not exist in file '{file}'")]
    PageNotExist { file: String, page_no: i32 },

    /// The slot bit is unset on read/update/delete, or already set on an
    /// explicit-rid insert.
    #[error("record not found at page {page_no} slot {slot_no}")]
    RecordNotFound { page_no: i32, slot_no: i32 },

    /// Record buffer length does not match the file's fixed record size.
    #[error("record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    // === Transaction errors ===
    /// The calling transaction must be aborted by its owner.
    #[error("transaction {txn_id} must abort: {reason}")]
    TransactionAbort { txn_id: u64, reason: AbortReason },

    // === Internal errors ===
    /// Internal invariant violation (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SiltError {
    /// Construct an [`SiltError::Internal`] from anything string-like.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Why a lock acquisition decided the calling transaction must abort.
///
/// Raised inside [`SiltError::TransactionAbort`]; the caller is expected
/// to catch it and drive the transaction manager's abort path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// `lock` was called after the transaction entered its shrinking
    /// phase, which strict two-phase locking forbids.
    LockOnShrinking,
    /// A lock upgrade conflicts with a lock granted to another
    /// transaction.
    UpgradeConflict,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockOnShrinking => f.write_str("lock requested in shrinking phase"),
            Self::UpgradeConflict => f.write_str("lock upgrade conflict"),
        }
    }
}

/// Result alias used across the workspace.
pub type Result<T, E = SiltError> = std::result::Result<T, E>;
