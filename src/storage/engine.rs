//! The storage engine: the blob map, its aggregates, and
//! victim selection. Insertion order is tracked by hand with a
//! `VecDeque<Vec<u8>>` alongside the `HashMap` rather than reaching for
//! an ordered-map crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ErrorCode;
use crate::stats::Statistics;

use super::blob::Blob;
use super::policy::EvictionPolicy;

pub struct Storage {
    blobs: HashMap<Vec<u8>, Blob>,
    /// Insertion order of currently-present names; required for FIFO
    /// eviction and for `read_n_files`' insertion-order snapshot.
    order: VecDeque<Vec<u8>>,
    total_bytes: u64,
    max_blobs: usize,
    max_bytes: u64,
    policy: EvictionPolicy,
    next_insertion_seq: u64,
    /// A logical clock, ticked on every successful operation, standing in
    /// for wall-clock `last_used_ts`. Avoids flaky LRU tests that
    /// would otherwise depend on real-time granularity. Atomic because
    /// `read_file` only takes the storage *read* lock yet must
    /// still advance this to record the touch.
    tick: AtomicU64,
    stats: Statistics,
}

/// The outcome of evicting zero or more blobs to make room. Carries the
/// full victim records so the caller can
/// perform the I/O side effects the engine itself has no access to:
/// notifying lock-queue waiters and, for the writer/appender path,
/// streaming each victim back to the requesting client as `FILE_P`.
pub struct EvictionOutcome {
    pub victims: Vec<Blob>,
}

impl Storage {
    pub fn new(max_blobs: usize, max_bytes: u64, policy: EvictionPolicy) -> Storage {
        Storage {
            blobs: HashMap::new(),
            order: VecDeque::new(),
            total_bytes: 0,
            max_blobs,
            max_bytes,
            policy,
            next_insertion_seq: 0,
            tick: AtomicU64::new(0),
            stats: Statistics::default(),
        }
    }

    pub fn num_blobs(&self) -> usize {
        self.blobs.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn max_blobs(&self) -> usize {
        self.max_blobs
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Advance and return the logical clock, for a blob's `touch` on a
    /// successful operation. `&self`, not `&mut self`: callers
    /// holding only a read lock (`read_file`) must still be able to call
    /// this.
    pub fn tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn find(&self, name: &[u8]) -> Option<&Blob> {
        self.blobs.get(name)
    }

    pub fn find_mut(&mut self, name: &[u8]) -> Option<&mut Blob> {
        self.blobs.get_mut(name)
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.blobs.contains_key(name)
    }

    /// Insert a freshly created, empty blob. Precondition: `name` is not
    /// already present (checked by the caller's dispatch logic, which
    /// must reject `OPEN_FILE` against an existing name before calling
    /// this).
    pub fn insert_new(&mut self, name: Vec<u8>) {
        debug_assert!(!self.blobs.contains_key(&name));
        let seq = self.next_insertion_seq;
        self.next_insertion_seq += 1;
        let blob = Blob::new(name.clone(), seq, self.tick.load(Ordering::Relaxed));
        self.order.push_back(name.clone());
        self.blobs.insert(name, blob);
        self.stats.peak_blobs = self.stats.peak_blobs.max(self.blobs.len());
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.total_bytes);
    }

    /// Replace a blob's payload, updating the byte aggregate. The caller
    /// is responsible for having already made room via [`Self::evict_until_fits`].
    pub fn set_bytes(&mut self, name: &[u8], bytes: Vec<u8>) {
        let blob = self.blobs.get_mut(name).expect("blob must exist");
        self.total_bytes -= blob.bytes.len() as u64;
        self.total_bytes += bytes.len() as u64;
        blob.bytes = bytes;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.total_bytes);
    }

    pub fn append_bytes(&mut self, name: &[u8], mut extra: Vec<u8>) {
        let blob = self.blobs.get_mut(name).expect("blob must exist");
        self.total_bytes += extra.len() as u64;
        blob.bytes.append(&mut extra);
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.total_bytes);
    }

    /// Remove a blob unconditionally (no-op if absent). Returns it so the
    /// caller can fail its wait-queue members.
    pub fn remove(&mut self, name: &[u8]) -> Option<Blob> {
        let blob = self.blobs.remove(name)?;
        self.total_bytes -= blob.bytes.len() as u64;
        if let Some(pos) = self.order.iter().position(|n| n == name) {
            self.order.remove(pos);
        }
        Some(blob)
    }

    fn victim_name(&self, exclude: Option<&[u8]>) -> Option<Vec<u8>> {
        let candidates = self.order.iter().filter(|n| exclude != Some(n.as_slice()));
        match self.policy {
            EvictionPolicy::Fifo => candidates.next().cloned(),
            EvictionPolicy::Lru => candidates
                .map(|n| (n, &self.blobs[n.as_slice()]))
                .min_by_key(|(_, b)| (b.last_used_tick(), b.insertion_seq))
                .map(|(n, _)| n.clone()),
            EvictionPolicy::Lfu => candidates
                .map(|n| (n, &self.blobs[n.as_slice()]))
                .min_by_key(|(_, b)| (b.use_count(), b.insertion_seq))
                .map(|(n, _)| n.clone()),
        }
    }

    /// Evict blobs, oldest-victim-first, until `total_bytes + bytes_needed
    /// <= max_bytes`, never evicting `exclude` (the blob the caller itself
    /// is about to mutate, for `append`). Returns `Err` if `exclude` is
    /// the only remaining candidate and space still isn't sufficient —
    /// the whole operation must then fail with `FILE_IS_TOO_BIG`.
    pub fn evict_until_fits(
        &mut self,
        bytes_needed: u64,
        exclude: Option<&[u8]>,
    ) -> Result<EvictionOutcome, ErrorCode> {
        let mut victims = Vec::new();
        while self.total_bytes + bytes_needed > self.max_bytes {
            match self.victim_name(exclude) {
                Some(name) => {
                    let blob = self.remove(&name).expect("victim name came from storage");
                    self.stats.eviction_count += 1;
                    victims.push(blob);
                }
                None => return Err(ErrorCode::FileIsTooBig),
            }
        }
        Ok(EvictionOutcome { victims })
    }

    /// Evict exactly one blob if inserting one more would breach
    /// `max_blobs`.
    /// The victim is deleted, never sent to the requester.
    pub fn evict_one_for_slot(&mut self) -> Option<Blob> {
        if self.blobs.len() + 1 <= self.max_blobs {
            return None;
        }
        let name = self.victim_name(None)?;
        let blob = self.remove(&name);
        if blob.is_some() {
            self.stats.eviction_count += 1;
        }
        blob
    }

    /// Names in insertion order, for `read_n_files`: a
    /// consistent snapshot taken under a single read-lock hold.
    pub fn names_in_order(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.order.iter()
    }

    /// Every resident blob, for client-disconnect cleanup:
    /// a client may appear in any number of blobs' open-sets or
    /// wait-queues, so cleanup must scan them all.
    pub fn blobs_mut(&mut self) -> impl Iterator<Item = &mut Blob> {
        self.blobs.values_mut()
    }

    pub fn stats_snapshot(&self) -> Statistics {
        self.stats
    }

    /// `(name, size)` for every blob still resident, in insertion order,
    /// for the shutdown report.
    pub fn remaining(&self) -> Vec<(Vec<u8>, usize)> {
        self.order
            .iter()
            .map(|name| (name.clone(), self.blobs[name.as_slice()].size()))
            .collect()
    }
}
