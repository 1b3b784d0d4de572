//! Hierarchical multi-granularity lock manager.
//!
//! A single mutex guards the whole lock table; each queue carries a
//! condvar that is notified on every release so callers layering a
//! blocking wait on top can re-check. Inside the manager `lock` never
//! blocks: an incompatible granted request makes it return `Ok(false)`
//! immediately, and the caller decides whether to retry, queue, or
//! abort. Upgrades that conflict, and any lock request in the shrinking
//! phase, abort the calling transaction instead.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use silt_error::{AbortReason, Result, SiltError};
use silt_types::{FileId, Rid, TxnId};

use crate::transaction::{Transaction, TransactionState};

/// Requestable lock modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// S: shared access to the object.
    Shared,
    /// X: exclusive access to the object.
    Exclusive,
    /// IS: intent to take S locks below this object.
    IntentionShared,
    /// IX: intent to take X locks below this object.
    IntentionExclusive,
    /// SIX: S on the object plus intent to take X locks below it.
    SharedIntentionExclusive,
}

impl LockMode {
    /// Whether two granted locks may coexist on one object.
    ///
    /// Symmetric by construction; `NON_LOCK` (an empty queue) is
    /// compatible with everything.
    #[must_use]
    pub fn is_compatible_with(self, other: Self) -> bool {
        use LockMode::{Exclusive, IntentionExclusive, IntentionShared, Shared};
        match (self, other) {
            (Exclusive, _) | (_, Exclusive) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) | (Shared, Shared) => true,
            _ => false,
        }
    }

    /// The group mode a granted request of this mode contributes.
    #[must_use]
    pub fn group_mode(self) -> GroupLockMode {
        match self {
            Self::IntentionShared => GroupLockMode::IntentionShared,
            Self::IntentionExclusive => GroupLockMode::IntentionExclusive,
            Self::Shared => GroupLockMode::Shared,
            Self::SharedIntentionExclusive => GroupLockMode::SharedIntentionExclusive,
            Self::Exclusive => GroupLockMode::Exclusive,
        }
    }
}

/// Strongest granted mode in a lock queue, cached for O(1) coarse
/// checks by higher layers.
///
/// The declaration order is the strength order used for recomputation:
/// `NonLock < IS < IX < S < SIX < X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupLockMode {
    NonLock,
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

/// What a [`LockDataId`] points at within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTarget {
    /// The whole table backing the file.
    Table,
    /// One record of the table.
    Record(Rid),
}

/// Identity of a lockable object: a table, or a record within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockDataId {
    pub fd: FileId,
    pub target: LockTarget,
}

impl LockDataId {
    #[inline]
    #[must_use]
    pub fn table(fd: FileId) -> Self {
        Self {
            fd,
            target: LockTarget::Table,
        }
    }

    #[inline]
    #[must_use]
    pub fn record(fd: FileId, rid: Rid) -> Self {
        Self {
            fd,
            target: LockTarget::Record(rid),
        }
    }
}

impl std::fmt::Display for LockDataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target {
            LockTarget::Table => write!(f, "table {}", self.fd),
            LockTarget::Record(rid) => write!(f, "record {}{}", self.fd, rid),
        }
    }
}

/// One request in a lock queue, in arrival order.
#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

/// Per-object queue of requests plus the cached group mode.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    group_mode: GroupLockMode,
    cv: Arc<Condvar>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            group_mode: GroupLockMode::NonLock,
            cv: Arc::new(Condvar::new()),
        }
    }
}

impl LockRequestQueue {
    fn recompute_group_mode(&mut self) {
        self.group_mode = self
            .requests
            .iter()
            .filter(|r| r.granted)
            .map(|r| r.mode.group_mode())
            .max()
            .unwrap_or(GroupLockMode::NonLock);
    }
}

/// Process-wide lock table.
#[derive(Default)]
pub struct LockManager {
    table: Mutex<HashMap<LockDataId, LockRequestQueue>>,
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared lock on one record.
    pub fn lock_shared_on_record(&self, txn: &Transaction, rid: Rid, fd: FileId) -> Result<bool> {
        self.lock(txn, LockDataId::record(fd, rid), LockMode::Shared)
    }

    /// Exclusive lock on one record.
    pub fn lock_exclusive_on_record(
        &self,
        txn: &Transaction,
        rid: Rid,
        fd: FileId,
    ) -> Result<bool> {
        self.lock(txn, LockDataId::record(fd, rid), LockMode::Exclusive)
    }

    /// Shared lock on a whole table.
    pub fn lock_shared_on_table(&self, txn: &Transaction, fd: FileId) -> Result<bool> {
        self.lock(txn, LockDataId::table(fd), LockMode::Shared)
    }

    /// Exclusive lock on a whole table.
    pub fn lock_exclusive_on_table(&self, txn: &Transaction, fd: FileId) -> Result<bool> {
        self.lock(txn, LockDataId::table(fd), LockMode::Exclusive)
    }

    /// Intention-shared lock on a table.
    pub fn lock_is_on_table(&self, txn: &Transaction, fd: FileId) -> Result<bool> {
        self.lock(txn, LockDataId::table(fd), LockMode::IntentionShared)
    }

    /// Intention-exclusive lock on a table.
    pub fn lock_ix_on_table(&self, txn: &Transaction, fd: FileId) -> Result<bool> {
        self.lock(txn, LockDataId::table(fd), LockMode::IntentionExclusive)
    }

    /// Acquire `mode` on `id` for `txn`.
    ///
    /// Returns `Ok(false)`, which is not an error, when an incompatible
    /// granted request blocks the acquisition. Returns
    /// [`SiltError::TransactionAbort`] when the transaction is in its
    /// shrinking phase or a lock upgrade hits a conflict.
    pub fn lock(&self, txn: &Transaction, id: LockDataId, mode: LockMode) -> Result<bool> {
        if txn.state() == TransactionState::Shrinking {
            return Err(SiltError::TransactionAbort {
                txn_id: txn.id().get(),
                reason: AbortReason::LockOnShrinking,
            });
        }

        let mut table = self.table.lock();
        let queue = table.entry(id).or_default();

        // A transaction re-requesting an object it already has a
        // request on either no-ops or upgrades.
        if let Some(pos) = queue
            .requests
            .iter()
            .position(|r| r.txn_id == txn.id())
        {
            if queue.requests[pos].granted && queue.requests[pos].mode == mode {
                return Ok(true);
            }
            let conflict = queue
                .requests
                .iter()
                .any(|r| r.txn_id != txn.id() && r.granted && !mode.is_compatible_with(r.mode));
            if conflict {
                return Err(SiltError::TransactionAbort {
                    txn_id: txn.id().get(),
                    reason: AbortReason::UpgradeConflict,
                });
            }
            let request = &mut queue.requests[pos];
            request.mode = mode;
            request.granted = true;
            queue.recompute_group_mode();
            txn.add_lock(id);
            return Ok(true);
        }

        // Fresh request: grant only if compatible with every granted
        // request, otherwise report the conflict without queueing.
        if queue
            .requests
            .iter()
            .any(|r| r.granted && !mode.is_compatible_with(r.mode))
        {
            return Ok(false);
        }

        queue.requests.push_back(LockRequest {
            txn_id: txn.id(),
            mode,
            granted: true,
        });
        queue.recompute_group_mode();
        txn.add_lock(id);
        if txn.state() == TransactionState::Default {
            txn.set_state(TransactionState::Growing);
        }
        Ok(true)
    }

    /// Release `txn`'s request on `id`.
    ///
    /// The first release moves a growing transaction into its shrinking
    /// phase. Returns `false` if no such request exists.
    pub fn unlock(&self, txn: &Transaction, id: LockDataId) -> bool {
        let mut table = self.table.lock();
        let Some(queue) = table.get_mut(&id) else {
            return false;
        };
        let Some(pos) = queue
            .requests
            .iter()
            .position(|r| r.txn_id == txn.id())
        else {
            return false;
        };
        queue.requests.remove(pos);
        txn.remove_lock(&id);
        if txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        let cv = Arc::clone(&queue.cv);
        if queue.requests.is_empty() {
            table.remove(&id);
        } else {
            queue.recompute_group_mode();
        }
        // Wake anyone who layered a blocking wait over the non-blocking
        // lock call.
        cv.notify_all();
        true
    }

    /// The strongest granted mode on `id`, or `None` if nothing holds
    /// it.
    #[must_use]
    pub fn group_lock_mode(&self, id: LockDataId) -> Option<GroupLockMode> {
        self.table.lock().get(&id).map(|q| q.group_mode)
    }
}
