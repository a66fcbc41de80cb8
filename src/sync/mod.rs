//! Hand-rolled synchronization primitives: a writer-preference RW lock
//! and a closable unbounded FIFO queue.

pub mod queue;
pub mod rwlock;

pub use queue::Queue;
pub use rwlock::RwLock;
