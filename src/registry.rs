//! The shared connection table.
//!
//! A connection fd is owned at any instant by exactly one of: the
//! acceptor's idle set, a worker, or a blob's lock-queue. A blob's wait
//! queue, though, stores plain [`ClientId`]s, not connections — so when a
//! worker needs to speak to a waiter it didn't itself read from, it needs a way to reach that
//! connection from any thread. This table is that: a shared,
//! lock-protected map from [`ClientId`] to a cheaply-cloneable handle on
//! its socket. "Ownership" above is a logical discipline enforced by the
//! acceptor/dispatch protocol, not by the Rust type system; the registry
//! is what makes that discipline possible without unsafe fd plumbing.

use std::collections::HashMap;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::ClientId;

#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<ClientId, Arc<UnixStream>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ClientId, stream: UnixStream) -> Arc<UnixStream> {
        let conn = Arc::new(stream);
        self.inner.lock().insert(id, conn.clone());
        conn
    }

    pub fn get(&self, id: ClientId) -> Option<Arc<UnixStream>> {
        self.inner.lock().get(&id).cloned()
    }

    /// Drop the registry's reference to this connection. If no worker
    /// still holds a clone, the socket is closed when the `Arc` reaches
    /// zero references.
    pub fn remove(&self, id: ClientId) {
        self.inner.lock().remove(&id);
    }
}
