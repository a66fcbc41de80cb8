//! An unbounded, multi-producer multi-consumer FIFO with a closed state.
//! Used for the master->workers handoff, the worker->master
//! notification pipe's in-process counterpart, and the log record queue.
//!
//! Built on `parking_lot::{Mutex, Condvar}` rather than reaching for a
//! channel crate.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

/// A cloneable handle to a shared FIFO queue. Cloning shares the
/// underlying queue (like an `Arc`), it does not create an independent
/// copy.
pub struct Queue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Queue {
            inner: self.inner.clone(),
        }
    }
}

/// Returned by [`Queue::put`] when the queue has already been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::new(),
                    closed: false,
                }),
                not_empty: Condvar::new(),
            }),
        }
    }

    /// Push an item. Fails distinctly if the queue is closed.
    pub fn put(&self, item: T) -> Result<(), Closed> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(Closed);
        }
        state.items.push_back(item);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Pop the oldest item, blocking while the queue is empty and open.
    /// Returns `None` once the queue is empty and closed.
    pub fn get(&self) -> Option<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.inner.not_empty.wait(&mut state);
        }
    }

    /// Close the queue and wake every blocked `get`. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        self.inner.not_empty.notify_all();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let q = Queue::new();
        q.put(1).unwrap();
        q.put(2).unwrap();
        q.put(3).unwrap();
        assert_eq!(q.get(), Some(1));
        assert_eq!(q.get(), Some(2));
        assert_eq!(q.get(), Some(3));
    }

    #[test]
    fn put_fails_after_close() {
        let q: Queue<i32> = Queue::new();
        q.close();
        assert_eq!(q.put(1), Err(Closed));
    }

    #[test]
    fn get_drains_then_returns_none_after_close() {
        let q = Queue::new();
        q.put(1).unwrap();
        q.close();
        assert_eq!(q.get(), Some(1));
        assert_eq!(q.get(), None);
    }

    #[test]
    fn blocked_get_wakes_on_put() {
        let q: Queue<i32> = Queue::new();
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.get());
        std::thread::sleep(Duration::from_millis(50));
        q.put(42).unwrap();
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn blocked_get_wakes_on_close() {
        let q: Queue<i32> = Queue::new();
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.get());
        std::thread::sleep(Duration::from_millis(50));
        q.close();
        assert_eq!(handle.join().unwrap(), None);
    }
}
