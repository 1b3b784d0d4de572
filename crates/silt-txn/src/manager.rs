//! Transaction manager: owns transaction identities and the active
//! transaction table, and drives lock release and undo.
//!
//! Commit discards the write set and releases locks; abort replays the
//! write set in reverse through the record manager before doing the
//! same. The log is flushed best-effort at both exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use silt_error::Result;
use silt_storage::LogManager;
use silt_types::{Timestamp, TxnId};

use crate::lock::LockManager;
use crate::registry::TableRegistry;
use crate::transaction::{Transaction, TransactionState, WriteRecord};

/// One transaction manager per engine instance.
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    next_timestamp: AtomicU64,
    txn_map: Mutex<HashMap<TxnId, Arc<Transaction>>>,
    lock_manager: Arc<LockManager>,
    registry: Arc<TableRegistry>,
}

impl TransactionManager {
    #[must_use]
    pub fn new(lock_manager: Arc<LockManager>, registry: Arc<TableRegistry>) -> Self {
        Self {
            next_txn_id: AtomicU64::new(0),
            next_timestamp: AtomicU64::new(0),
            txn_map: Mutex::new(HashMap::new()),
            lock_manager,
            registry,
        }
    }

    /// The lock manager this transaction manager releases through.
    #[must_use]
    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Begin a transaction.
    ///
    /// Passing an existing transaction restarts it (after an explicit
    /// rollback); passing `None` allocates the next identifier. Either
    /// way the transaction enters its growing phase with a fresh start
    /// timestamp and joins the active table.
    pub fn begin(
        &self,
        txn: Option<Arc<Transaction>>,
        _log_manager: &LogManager,
    ) -> Arc<Transaction> {
        let txn = txn.unwrap_or_else(|| {
            let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
            Arc::new(Transaction::new(id))
        });
        txn.set_state(TransactionState::Growing);
        txn.set_start_ts(Timestamp::new(
            self.next_timestamp.fetch_add(1, Ordering::SeqCst),
        ));
        self.txn_map.lock().insert(txn.id(), Arc::clone(&txn));
        tracing::debug!(txn_id = %txn.id(), "begin transaction");
        txn
    }

    /// Look up an active transaction by id.
    #[must_use]
    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.lock().get(&txn_id).cloned()
    }

    /// Commit: drop the write set, release all locks, flush the log,
    /// and retire the transaction.
    pub fn commit(&self, txn: &Arc<Transaction>, log_manager: &LogManager) {
        // The writes are already in place; the undo information is no
        // longer needed.
        drop(txn.take_write_set());
        self.release_all_locks(txn);
        self.flush_log(log_manager);
        txn.set_state(TransactionState::Committed);
        self.txn_map.lock().remove(&txn.id());
        tracing::info!(txn_id = %txn.id(), "committed");
    }

    /// Abort: undo the write set in reverse order, release all locks,
    /// flush the log, and retire the transaction.
    ///
    /// A write against a table that is no longer registered is skipped;
    /// the engine is racing a dropped table.
    pub fn abort(&self, txn: &Arc<Transaction>, log_manager: &LogManager) -> Result<()> {
        let mut write_set = txn.take_write_set();
        while let Some(write_record) = write_set.pop() {
            let Some(file_handle) = self.registry.get(write_record.table()) else {
                tracing::warn!(
                    txn_id = %txn.id(),
                    table = write_record.table(),
                    "skipping undo for unregistered table"
                );
                continue;
            };
            let mut file_handle = file_handle.write();
            match write_record {
                WriteRecord::Insert { rid, .. } => {
                    file_handle.delete_record(rid)?;
                }
                WriteRecord::Delete { rid, record, .. } => {
                    file_handle.insert_record_at(rid, record.data())?;
                }
                WriteRecord::Update {
                    rid, old_record, ..
                } => {
                    file_handle.update_record(rid, old_record.data())?;
                }
            }
        }
        self.release_all_locks(txn);
        self.flush_log(log_manager);
        txn.set_state(TransactionState::Aborted);
        self.txn_map.lock().remove(&txn.id());
        tracing::info!(txn_id = %txn.id(), "aborted");
        Ok(())
    }

    fn release_all_locks(&self, txn: &Arc<Transaction>) {
        for id in txn.lock_set() {
            self.lock_manager.unlock(txn, id);
        }
        txn.clear_lock_set();
    }

    fn flush_log(&self, log_manager: &LogManager) {
        if let Err(err) = log_manager.flush_log_to_disk() {
            tracing::warn!(error = %err, "log flush failed");
        }
    }
}
