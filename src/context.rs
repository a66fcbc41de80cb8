//! The immutable context every worker thread shares.

use std::os::fd::RawFd;

use crate::registry::Registry;
use crate::storage::Storage;
use crate::sync::RwLock;

pub struct Context {
    pub storage: RwLock<Storage>,
    pub registry: Registry,
    pub compression: bool,
    /// Write end of the worker->master notification pipe.
    pub notify_write: RawFd,
}

impl Context {
    pub fn new(storage: Storage, registry: Registry, compression: bool, notify_write: RawFd) -> Context {
        Context {
            storage: RwLock::new(storage),
            registry,
            compression,
            notify_write,
        }
    }
}
