//! facematch-store — implementations of the comparison persistence
//! collaborator.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
