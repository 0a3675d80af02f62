pub mod completed;
pub mod kv;
pub mod media_store;

pub use completed::CompletedSet;
pub use kv::{KvStore, MemoryKv, RocksKv};
pub use media_store::MediaStore;
