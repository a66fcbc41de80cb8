//! The storage engine: the blob map, its
//! eviction policy, and per-blob open/lock state.

pub mod blob;
pub mod engine;
pub mod policy;

pub use blob::Blob;
pub use engine::{EvictionOutcome, Storage};
pub use policy::EvictionPolicy;
