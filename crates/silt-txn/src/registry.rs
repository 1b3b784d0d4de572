//! The slice of the catalog the transaction manager consumes: open
//! record-file handles keyed by table name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use silt_record::RmFileHandle;

/// Shared handle to a registered table's record file.
pub type SharedFileHandle = Arc<RwLock<RmFileHandle>>;

/// Table-name to file-handle map used to resolve undo targets.
#[derive(Default)]
pub struct TableRegistry {
    fhs: RwLock<HashMap<String, SharedFileHandle>>,
}

impl TableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open file handle under a table name.
    pub fn register(&self, table: impl Into<String>, file_handle: SharedFileHandle) {
        self.fhs.write().insert(table.into(), file_handle);
    }

    /// Look up a table's file handle.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<SharedFileHandle> {
        self.fhs.read().get(table).cloned()
    }

    /// Drop a table's registration, returning the handle if present.
    pub fn remove(&self, table: &str) -> Option<SharedFileHandle> {
        self.fhs.write().remove(table)
    }
}
