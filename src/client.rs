//! The client handle: an opaque identifier naming one connected client for
//! the life of its connection. It is never used to
//! reach the connection directly — see [`crate::registry`] — so blobs can
//! hold queues of identifiers instead of references, breaking the
//! blob<->waiter cycle the original C implementation expressed through
//! raw fds doing double duty as both identifier and handle.

use std::os::unix::io::RawFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub RawFd);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}
