//! The acceptor / master loop: owns the listening socket, the
//! idle-fd set, and the three endpoints it always polls (the listener,
//! the signal pipe, the worker->master notification pipe), multiplexed
//! with a single `nix::poll` call per iteration rather than an async
//! runtime.

use std::collections::HashSet;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixListener;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::client::ClientId;
use crate::error::fatal;
use crate::notify::{read_byte, read_notification};
use crate::registry::Registry;
use crate::signals::{HARD_EXIT, SOFT_EXIT};
use crate::sync::Queue;

pub struct Master {
    listener: UnixListener,
    signal_read: RawFd,
    notify_read: RawFd,
    to_workers: Queue<ClientId>,
    registry: Registry,
    idle: HashSet<RawFd>,
    num_clients: usize,
    accepting: bool,
    hard: bool,
    soft: bool,
}

impl Master {
    pub fn new(
        listener: UnixListener,
        signal_read: RawFd,
        notify_read: RawFd,
        to_workers: Queue<ClientId>,
        registry: Registry,
    ) -> Master {
        Master {
            listener,
            signal_read,
            notify_read,
            to_workers,
            registry,
            idle: HashSet::new(),
            num_clients: 0,
            accepting: true,
            hard: false,
            soft: false,
        }
    }

    /// Run until a hard exit is requested, or a soft exit is requested
    /// and every client has disconnected. Closes
    /// the master->workers queue on the way out so the worker pool can
    /// drain and exit.
    pub fn run(&mut self) {
        while !self.hard && !(self.soft && self.num_clients == 0) {
            self.poll_once();
        }
        self.to_workers.close();
    }

    fn poll_once(&mut self) {
        let listener_fd = self.listener.as_fd();
        let signal_fd = unsafe { BorrowedFd::borrow_raw(self.signal_read) };
        let notify_fd = unsafe { BorrowedFd::borrow_raw(self.notify_read) };

        let idle_snapshot: Vec<RawFd> = self.idle.iter().copied().collect();
        // SAFETY: every fd in `idle_snapshot` is owned by a live
        // `UnixStream` held in `self.registry` for the duration of this
        // call; `poll` never closes fds, only inspects readiness.
        let idle_borrowed: Vec<BorrowedFd<'_>> = idle_snapshot
            .iter()
            .map(|fd| unsafe { BorrowedFd::borrow_raw(*fd) })
            .collect();

        let mut fds = Vec::with_capacity(3 + idle_borrowed.len());
        if self.accepting {
            fds.push(PollFd::new(listener_fd, PollFlags::POLLIN));
        }
        fds.push(PollFd::new(signal_fd, PollFlags::POLLIN));
        fds.push(PollFd::new(notify_fd, PollFlags::POLLIN));
        for fd in &idle_borrowed {
            fds.push(PollFd::new(*fd, PollFlags::POLLIN));
        }

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => return,
            Err(e) => fatal(&format!("poll failed: {e}")),
        }

        let mut idx = 0;
        if self.accepting {
            if is_ready(&fds[idx]) {
                self.accept_one();
            }
            idx += 1;
        }
        if is_ready(&fds[idx]) {
            self.handle_signal();
        }
        idx += 1;
        if is_ready(&fds[idx]) {
            self.handle_notify();
        }
        idx += 1;
        for fd in idle_snapshot {
            if is_ready(&fds[idx]) {
                self.idle.remove(&fd);
                if self.to_workers.put(ClientId(fd)).is_err() {
                    fatal("master->workers queue closed while still dispatching requests");
                }
            }
            idx += 1;
        }
    }

    fn accept_one(&mut self) {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                let fd = stream.as_raw_fd();
                self.registry.insert(ClientId(fd), stream);
                self.idle.insert(fd);
                self.num_clients += 1;
            }
            Err(e) => log::warn!("accept failed: {e}"),
        }
    }

    fn handle_signal(&mut self) {
        match read_byte(self.signal_read) {
            HARD_EXIT => {
                self.accepting = false;
                self.hard = true;
            }
            SOFT_EXIT => {
                self.accepting = false;
                self.soft = true;
            }
            other => fatal(&format!("unrecognized signal-pipe byte {other}")),
        }
    }

    fn handle_notify(&mut self) {
        match read_notification(self.notify_read) {
            0 => fatal("received a zero-valued worker notification"),
            value if value > 0 => {
                self.idle.insert(value);
            }
            _ => {
                self.num_clients -= 1;
            }
        }
    }
}

fn is_ready(fd: &PollFd) -> bool {
    fd.revents().is_some_and(|revents| {
        revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    })
}
