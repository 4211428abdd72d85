//! Bucket store implementations.
//!
//! [`RedisBucketStore`] shares bucket state between processes through a
//! Redis server. [`MemoryBucketStore`] keeps it inside one process.

mod memory;
mod redis_store;

pub use memory::MemoryBucketStore;
pub use redis_store::RedisBucketStore;
