//! Transactions over the silt record manager: a hierarchical
//! multi-granularity lock manager, transaction objects with write-sets,
//! and the transaction manager that ties commit and undo-driven abort
//! together.

pub mod lock;
pub mod manager;
pub mod registry;
pub mod transaction;

pub use lock::{GroupLockMode, LockDataId, LockManager, LockMode, LockTarget};
pub use manager::TransactionManager;
pub use registry::{SharedFileHandle, TableRegistry};
pub use transaction::{Transaction, TransactionState, WriteRecord};
