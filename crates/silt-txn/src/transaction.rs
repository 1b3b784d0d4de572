//! Transaction objects: state machine, lock set, write set.
//!
//! A [`Transaction`] is shared behind an `Arc` between its owning thread
//! and the lock/transaction managers; the mutable pieces sit behind
//! small `parking_lot` mutexes. The write set is an ordered log of the
//! transaction's mutations, consumed in reverse by abort; populating it
//! (including pre-image capture for updates and deletes) is the
//! caller's responsibility.

use std::collections::HashSet;

use parking_lot::Mutex;
use silt_record::Record;
use silt_types::{Rid, Timestamp, TxnId};

use crate::lock::LockDataId;

/// Two-phase-locking lifecycle states.
///
/// `Default -> Growing -> Shrinking -> {Committed, Aborted}`, with
/// direct aborts out of `Default` and `Growing` also permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Default,
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// One entry of a transaction's write set.
///
/// `Delete` and `Update` carry the pre-image needed to restore the
/// record on abort.
#[derive(Debug, Clone)]
pub enum WriteRecord {
    Insert {
        table: String,
        rid: Rid,
    },
    Delete {
        table: String,
        rid: Rid,
        record: Record,
    },
    Update {
        table: String,
        rid: Rid,
        old_record: Record,
    },
}

impl WriteRecord {
    /// Name of the table the write touched.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Delete { table, .. } | Self::Update { table, .. } => {
                table
            }
        }
    }

    /// Location of the record the write touched.
    #[must_use]
    pub fn rid(&self) -> Rid {
        match self {
            Self::Insert { rid, .. } | Self::Delete { rid, .. } | Self::Update { rid, .. } => *rid,
        }
    }
}

/// A single transaction.
pub struct Transaction {
    txn_id: TxnId,
    state: Mutex<TransactionState>,
    start_ts: Mutex<Timestamp>,
    lock_set: Mutex<HashSet<LockDataId>>,
    write_set: Mutex<Vec<WriteRecord>>,
}

impl Transaction {
    #[must_use]
    pub fn new(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            state: Mutex::new(TransactionState::Default),
            start_ts: Mutex::new(Timestamp::ZERO),
            lock_set: Mutex::new(HashSet::new()),
            write_set: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.txn_id
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    #[must_use]
    pub fn start_ts(&self) -> Timestamp {
        *self.start_ts.lock()
    }

    pub fn set_start_ts(&self, ts: Timestamp) {
        *self.start_ts.lock() = ts;
    }

    /// Append a mutation to the write set.
    pub fn append_write_record(&self, write_record: WriteRecord) {
        self.write_set.lock().push(write_record);
    }

    /// Number of writes recorded so far.
    #[must_use]
    pub fn write_set_len(&self) -> usize {
        self.write_set.lock().len()
    }

    /// Drain the write set, in append order.
    pub(crate) fn take_write_set(&self) -> Vec<WriteRecord> {
        std::mem::take(&mut self.write_set.lock())
    }

    /// Snapshot of the lock identifiers currently held.
    #[must_use]
    pub fn lock_set(&self) -> HashSet<LockDataId> {
        self.lock_set.lock().clone()
    }

    /// Whether the transaction currently holds a request on `id`.
    #[must_use]
    pub fn holds_lock(&self, id: &LockDataId) -> bool {
        self.lock_set.lock().contains(id)
    }

    pub(crate) fn add_lock(&self, id: LockDataId) {
        self.lock_set.lock().insert(id);
    }

    pub(crate) fn remove_lock(&self, id: &LockDataId) {
        self.lock_set.lock().remove(id);
    }

    pub(crate) fn clear_lock_set(&self) {
        self.lock_set.lock().clear();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("txn_id", &self.txn_id)
            .field("state", &self.state())
            .field("start_ts", &self.start_ts())
            .field("locks", &self.lock_set.lock().len())
            .field("writes", &self.write_set.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_defaults() {
        let txn = Transaction::new(TxnId::new(1));
        assert_eq!(txn.state(), TransactionState::Default);
        assert_eq!(txn.start_ts(), Timestamp::ZERO);
        assert_eq!(txn.write_set_len(), 0);
        assert!(txn.lock_set().is_empty());
    }

    #[test]
    fn test_write_set_preserves_append_order() {
        let txn = Transaction::new(TxnId::new(1));
        txn.append_write_record(WriteRecord::Insert {
            table: "t".into(),
            rid: Rid::new(1, 0),
        });
        txn.append_write_record(WriteRecord::Update {
            table: "t".into(),
            rid: Rid::new(1, 0),
            old_record: Record::new(vec![1, 2]),
        });
        let writes = txn.take_write_set();
        assert_eq!(writes.len(), 2);
        assert!(matches!(writes[0], WriteRecord::Insert { .. }));
        assert!(matches!(writes[1], WriteRecord::Update { .. }));
        assert_eq!(txn.write_set_len(), 0);
    }

    #[test]
    fn test_write_record_accessors() {
        let wr = WriteRecord::Delete {
            table: "emp".into(),
            rid: Rid::new(2, 3),
            record: Record::new(vec![0; 4]),
        };
        assert_eq!(wr.table(), "emp");
        assert_eq!(wr.rid(), Rid::new(2, 3));
    }
}
