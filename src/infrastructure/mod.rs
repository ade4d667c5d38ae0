pub mod clock;
pub mod in_memory;
pub mod recording;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
