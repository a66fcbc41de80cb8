//! Signal handling: `SIGINT`, `SIGQUIT`, `SIGHUP` and `SIGPIPE`
//! are blocked process-wide so that ordinary socket writes see `EPIPE`
//! instead of killing the process, and a dedicated thread turns the
//! first shutdown-relevant signal into a single byte on a pipe the
//! master polls alongside its sockets.

use std::os::fd::RawFd;
use std::thread::JoinHandle;

use nix::sys::signal::{pthread_sigmask, sigwait, SigSet, SigmaskHow, Signal};

use crate::error::fatal;
use crate::notify::write_byte;

/// Byte written to the signal pipe for `SIGINT`/`SIGQUIT`.
pub const HARD_EXIT: u8 = 1;
/// Byte written to the signal pipe for `SIGHUP`.
pub const SOFT_EXIT: u8 = 2;

fn managed_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGQUIT);
    set.add(Signal::SIGHUP);
    set.add(Signal::SIGPIPE);
    set
}

/// Block the managed signal set on the calling thread. Must run on the
/// process's main thread before any other thread is spawned so every
/// later thread inherits the same mask.
pub fn block_globally() {
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&managed_set()), None)
        .unwrap_or_else(|e| fatal(&format!("failed to block signals: {e}")));
}

/// Spawn the signal-waiter thread. It synchronously dequeues blocked
/// signals with `sigwait`, silently absorbing any number of `SIGPIPE`s
/// (blocking it exists only to keep it from killing writers), and exits
/// after writing the first `SIGINT`/`SIGQUIT`/`SIGHUP` to `signal_write`.
pub fn spawn_waiter(signal_write: RawFd) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("memfiled-signal".into())
        .spawn(move || {
            let set = managed_set();
            loop {
                match sigwait(&set) {
                    Ok(Signal::SIGINT) | Ok(Signal::SIGQUIT) => {
                        write_byte(signal_write, HARD_EXIT);
                        return;
                    }
                    Ok(Signal::SIGHUP) => {
                        write_byte(signal_write, SOFT_EXIT);
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => fatal(&format!("sigwait failed: {e}")),
                }
            }
        })
        .expect("failed to spawn signal-waiter thread")
}
