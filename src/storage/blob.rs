//! A single in-memory file record and its per-blob open/lock
//! state machines.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::client::ClientId;

/// A blob's per-file record. Names are unique within a [`super::Storage`];
/// a blob is destroyed by `remove` or by eviction, never mutated in place
/// across an identity change.
///
/// `last_used_tick`/`use_count` are atomics rather than plain `u64`s:
/// `READ_FILE` only takes the storage *read* lock, yet must still bump
/// its LRU/LFU bookkeeping. An atomic relaxed update lets that happen
/// without upgrading to a write lock for what is otherwise a pure read.
#[derive(Debug)]
pub struct Blob {
    pub name: Vec<u8>,
    pub bytes: Vec<u8>,
    /// Clients that currently hold this blob open. Most blobs have very
    /// few concurrent openers, hence `SmallVec` over a full `HashSet`.
    pub opened_by: SmallVec<[ClientId; 4]>,
    pub locked_by: Option<ClientId>,
    /// FIFO queue of clients blocked in `lock` on this blob.
    /// `locked_by` is never also present in this queue (invariant 3).
    pub lock_wait_queue: VecDeque<ClientId>,
    last_used_tick: AtomicU64,
    use_count: AtomicU64,
    /// Monotonically increasing insertion sequence number, used both for
    /// FIFO eviction order and as the LRU/LFU tie-break.
    pub insertion_seq: u64,
}

impl Blob {
    pub fn new(name: Vec<u8>, insertion_seq: u64, tick: u64) -> Blob {
        Blob {
            name,
            bytes: Vec::new(),
            opened_by: SmallVec::new(),
            locked_by: None,
            lock_wait_queue: VecDeque::new(),
            last_used_tick: AtomicU64::new(tick),
            use_count: AtomicU64::new(0),
            insertion_seq,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn last_used_tick(&self) -> u64 {
        self.last_used_tick.load(Ordering::Relaxed)
    }

    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }

    pub fn is_opened_by(&self, client: ClientId) -> bool {
        self.opened_by.contains(&client)
    }

    pub fn open_for(&mut self, client: ClientId) {
        if !self.is_opened_by(client) {
            self.opened_by.push(client);
        }
    }

    pub fn close_for(&mut self, client: ClientId) -> bool {
        if let Some(pos) = self.opened_by.iter().position(|c| *c == client) {
            self.opened_by.remove(pos);
            true
        } else {
            false
        }
    }

    /// Remove `client` from the wait queue, wherever it is. Used both for
    /// silent disconnect cleanup and defensively before
    /// enqueueing (invariant 3: no duplicate entries).
    pub fn remove_waiter(&mut self, client: ClientId) -> bool {
        if let Some(pos) = self.lock_wait_queue.iter().position(|c| *c == client) {
            self.lock_wait_queue.remove(pos);
            true
        } else {
            false
        }
    }

    /// Record a successful operation against this blob. Takes `&self` so it
    /// can be called while only a read lock on the storage map is held.
    pub fn touch(&self, tick: u64) {
        self.last_used_tick.store(tick, Ordering::Relaxed);
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }
}
