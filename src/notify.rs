//! The worker -> master notification channel: a
//! self-pipe carrying one value per notification. A positive 32-bit
//! value means "this client fd is idle again"; negative means "this
//! client disconnected, the worker already closed its fd". The signal-waiter thread uses the
//! same byte-oriented plumbing for its own one-byte pipe.

use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::unistd::{read, write};

use crate::client::ClientId;
use crate::error::fatal;

fn write_exact(fd: RawFd, buf: &[u8]) {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut written = 0;
    while written < buf.len() {
        match write(borrowed, &buf[written..]) {
            Ok(0) => fatal("notification pipe write returned 0"),
            Ok(n) => written += n,
            Err(Errno::EINTR) => continue,
            Err(e) => fatal(&format!("notification pipe write failed: {e}")),
        }
    }
}

fn read_exact(fd: RawFd, buf: &mut [u8]) {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut filled = 0;
    while filled < buf.len() {
        match read(borrowed, &mut buf[filled..]) {
            Ok(0) => fatal("notification pipe closed unexpectedly"),
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(e) => fatal(&format!("notification pipe read failed: {e}")),
        }
    }
}

/// Tell the master that `client`'s fd is readable again and should
/// return to its idle set.
pub fn notify_idle(fd: RawFd, client: ClientId) {
    debug_assert!(client.0 > 0, "client fds are always positive");
    write_exact(fd, &client.0.to_ne_bytes());
}

/// Tell the master that `client` disconnected; the worker has already
/// closed the fd, so the master only needs to decrement its count.
pub fn notify_disconnected(fd: RawFd, client: ClientId) {
    debug_assert!(client.0 > 0, "client fds are always positive");
    write_exact(fd, &(-client.0).to_ne_bytes());
}

/// Read one notification value off the master's end of the pipe.
pub fn read_notification(fd: RawFd) -> i32 {
    let mut buf = [0u8; 4];
    read_exact(fd, &mut buf);
    i32::from_ne_bytes(buf)
}

/// Write a single event byte.
pub fn write_byte(fd: RawFd, byte: u8) {
    write_exact(fd, &[byte]);
}

/// Read a single event byte.
pub fn read_byte(fd: RawFd) -> u8 {
    let mut buf = [0u8; 1];
    read_exact(fd, &mut buf);
    buf[0]
}
