pub mod keys;
pub mod memory;
pub mod r#trait;

pub use memory::MemoryStore;
pub use r#trait::{PersistentStore, SharedStore};
