pub mod conformance;
mod error;
mod fs;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use fs::{FsCacheStore, FsJournalStore};
pub use memory::{MemoryCacheStore, MemoryJournalStore};
pub use record::{
    generate_id, is_valid_id, sentinel, BranchRecord, JournalState, PendingStep, SplitRecord,
    WriteBatch,
};
pub use traits::{CacheStore, JournalStore};
