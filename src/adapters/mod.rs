// Adapters layer: concrete implementations of the storage ports.

pub mod file;
pub mod memory;

pub use file::{FileSubmissionStore, JsonlArchive};
pub use memory::{MemoryArchive, MemorySubmissionStore};
