//! A writer-preference readers/writers lock.
//!
//! New readers block whenever a writer is active or waiting; a writer
//! blocks while any reader or writer is active. On writer exit, a waiting
//! writer is woken in preference to waiting readers; only if none is
//! waiting are all waiting readers released together. This starves long
//! reader bursts in favour of writers, matching the workload (writes
//! mutate eviction order and must not be delayed indefinitely by a stream
//! of reads).
//!
//! The state machine mirrors the original C `rw_lock_t` (two condition
//! variables, `active_readers`/`waiting_readers`/`active_writers`/
//! `waiting_writers` counters) faithfully; only the primitives are
//! idiomatic Rust (`parking_lot::{Mutex, Condvar}`, RAII guards instead of
//! explicit `_lock`/`_unlock` calls).

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct Counters {
    active_readers: usize,
    waiting_readers: usize,
    active_writers: usize,
    waiting_writers: usize,
}

impl Counters {
    fn readers_should_wait(&self) -> bool {
        self.active_writers > 0 || self.waiting_writers > 0
    }

    fn writer_should_wait(&self) -> bool {
        self.active_readers > 0 || self.active_writers > 0
    }
}

struct Inner<T> {
    counters: Mutex<Counters>,
    read_go: Condvar,
    write_go: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through `ReadGuard`/
// `WriteGuard`, which are only constructed after the counters prove
// exclusive (write) or shared (read) access is safe.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// A writer-preference RW lock over `T`.
pub struct RwLock<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RwLock<T> {
    fn clone(&self) -> Self {
        RwLock {
            inner: self.inner.clone(),
        }
    }
}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        RwLock {
            inner: Arc::new(Inner {
                counters: Mutex::new(Counters {
                    active_readers: 0,
                    waiting_readers: 0,
                    active_writers: 0,
                    waiting_writers: 0,
                }),
                read_go: Condvar::new(),
                write_go: Condvar::new(),
                data: UnsafeCell::new(value),
            }),
        }
    }

    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut counters = self.inner.counters.lock();
        counters.waiting_readers += 1;
        while counters.readers_should_wait() {
            self.inner.read_go.wait(&mut counters);
        }
        counters.waiting_readers -= 1;
        counters.active_readers += 1;
        drop(counters);
        ReadGuard { lock: self }
    }

    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut counters = self.inner.counters.lock();
        counters.waiting_writers += 1;
        while counters.writer_should_wait() {
            self.inner.write_go.wait(&mut counters);
        }
        counters.waiting_writers -= 1;
        counters.active_writers += 1;
        drop(counters);
        WriteGuard { lock: self }
    }

    fn unlock_read(&self) {
        let mut counters = self.inner.counters.lock();
        counters.active_readers -= 1;
        if counters.active_readers == 0 && counters.waiting_writers > 0 {
            self.inner.write_go.notify_one();
        }
    }

    fn unlock_write(&self) {
        let mut counters = self.inner.counters.lock();
        counters.active_writers -= 1;
        if counters.waiting_writers > 0 {
            self.inner.write_go.notify_one();
        } else {
            self.inner.read_go.notify_all();
        }
    }
}

/// RAII read guard; releases the lock (and potentially wakes a waiting
/// writer) on drop.
pub struct ReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: at least one active reader and no active/waiting writer
        // holds exclusive rights while this guard is alive.
        unsafe { &*self.lock.inner.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

/// RAII write guard; releases the lock (waking a waiting writer in
/// preference to waiting readers) on drop.
pub struct WriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: this is the sole active writer.
        unsafe { &*self.lock.inner.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this is the sole active writer.
        unsafe { &mut *self.lock.inner.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn single_writer_mutates_visibly() {
        let lock = RwLock::new(0usize);
        *lock.write() += 1;
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn concurrent_readers_allowed() {
        let lock = RwLock::new(5usize);
        let g1 = lock.read();
        let g2 = lock.read();
        assert_eq!(*g1, 5);
        assert_eq!(*g2, 5);
    }

    #[test]
    fn writer_waits_for_readers_to_drain() {
        let lock = RwLock::new(0usize);
        let reached_write = Arc::new(AtomicUsize::new(0));

        let read_guard = lock.read();
        let lock2 = lock.clone();
        let flag = reached_write.clone();
        let writer = std::thread::spawn(move || {
            let mut g = lock2.write();
            flag.store(1, Ordering::SeqCst);
            *g = 99;
        });

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(reached_write.load(Ordering::SeqCst), 0);
        drop(read_guard);
        writer.join().unwrap();
        assert_eq!(*lock.read(), 99);
    }

    #[test]
    fn waiting_writer_blocks_new_readers() {
        let lock = RwLock::new(0usize);
        let hold = lock.read();

        let lock2 = lock.clone();
        let writer_started = Arc::new(AtomicUsize::new(0));
        let flag = writer_started.clone();
        let writer = std::thread::spawn(move || {
            flag.store(1, Ordering::SeqCst);
            let mut g = lock2.write();
            *g = 1;
        });

        // give the writer time to register as waiting
        std::thread::sleep(Duration::from_millis(50));

        let lock3 = lock.clone();
        let new_reader_got_in = Arc::new(AtomicUsize::new(0));
        let flag2 = new_reader_got_in.clone();
        let reader = std::thread::spawn(move || {
            let _g = lock3.read();
            flag2.store(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(new_reader_got_in.load(Ordering::SeqCst), 0);

        drop(hold);
        writer.join().unwrap();
        reader.join().unwrap();
    }
}
