//! Storage plumbing for the silt engine: disk manager, buffer pool
//! manager with scoped page guards, and a best-effort log manager.
//!
//! The record layer above fetches pages exclusively through
//! [`BufferPoolManager`]; every fetched page comes back wrapped in a
//! [`PageGuard`] whose drop performs the unpin, so no exit path can leak
//! a pin.

pub mod buffer_pool;
pub mod disk;
pub mod log;
pub mod page;
pub mod replacer;

pub use buffer_pool::BufferPoolManager;
pub use disk::DiskManager;
pub use log::LogManager;
pub use page::PageGuard;
pub use replacer::LruReplacer;
