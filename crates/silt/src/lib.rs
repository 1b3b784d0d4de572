//! Public API facade for the silt storage engine.
//!
//! Re-exports the engine's crates (storage plumbing, the slotted-page
//! record manager, and the lock/transaction layer) so embedders and
//! integration tests depend on one crate. Wiring is explicit: construct
//! a [`DiskManager`], a [`BufferPoolManager`] over it, an [`RmManager`]
//! for record files, and a [`TransactionManager`] over a [`LockManager`]
//! and [`TableRegistry`].

pub use silt_error::{AbortReason, Result, SiltError};
pub use silt_types::{
    FileId, PageId, Rid, Timestamp, TxnId, FIRST_RECORD_PAGE, NO_PAGE, PAGE_SIZE,
};

pub use silt_storage::{BufferPoolManager, DiskManager, LogManager, PageGuard};

pub use silt_record::{Record, RmFileHandle, RmFileHdr, RmManager, RmPageHandle, RmScan};

pub use silt_txn::{
    GroupLockMode, LockDataId, LockManager, LockMode, LockTarget, SharedFileHandle, TableRegistry,
    Transaction, TransactionManager, TransactionState, WriteRecord,
};
