//! Chunk partitioning and merging.
//!
//! Splits a download into contiguous chunk descriptors, and later concatenates the
//! chunk storages back into one byte stream in ascending offset order.

mod chunk;
mod merge;
mod plan;

pub use chunk::Chunk;
pub use merge::merge_chunks;
pub use plan::{partition, plan_ranges};
