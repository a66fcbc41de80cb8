//! Top-level wiring: binds the listening socket, sets up the two
//! self-pipes, and assembles the storage engine, registry, worker pool,
//! and acceptor into something runnable. Offers both a blocking `run`
//! and a backgroundable `spawn` rather than exposing only one or the
//! other.

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use nix::unistd::pipe;

use crate::client::ClientId;
use crate::config::Config;
use crate::context::Context;
use crate::logging::LoggerHandle;
use crate::master::Master;
use crate::notify::write_byte;
use crate::pool::Pool;
use crate::registry::Registry;
use crate::signals::{self, HARD_EXIT, SOFT_EXIT};
use crate::stats::ShutdownReport;
use crate::storage::Storage;
use crate::sync::Queue;
use crate::worker;

/// Bind the socket named in `config` and run until an OS signal requests shutdown. Blocks the calling thread for the life of
/// the server. The caller must have already called
/// [`crate::signals::block_globally`] before spawning any other thread,
/// including the logger. `logger`, if given, is closed and joined as part
/// of this function's own shutdown sequence (after the worker pool joins,
/// before the listening socket is closed) rather than left to the
/// caller's own teardown.
pub fn run(config: &Config, logger: Option<LoggerHandle>) -> io::Result<ShutdownReport> {
    let (sig_read, sig_write) = pipe()?;
    let signal_thread = signals::spawn_waiter(sig_write.as_raw_fd());
    let report = run_with_signal_pipe(config, sig_read.as_raw_fd(), logger)?;
    let _ = signal_thread.join();
    Ok(report)
    // `sig_write` drops here, after the signal thread (which held the only
    // other reference to its fd number, never the handle itself) has
    // already exited.
}

/// A server running on a background thread, for tests and embedders that
/// want to drive shutdown programmatically instead of by sending the
/// process a real signal.
pub struct BackgroundServer {
    sig_write: OwnedFd,
    join: Option<JoinHandle<io::Result<ShutdownReport>>>,
}

impl BackgroundServer {
    /// Request shutdown and wait for it to complete. `hard` mirrors
    /// `SIGINT`/`SIGQUIT` (stop accepting immediately); otherwise mirrors
    /// `SIGHUP`.
    pub fn shutdown(mut self, hard: bool) -> io::Result<ShutdownReport> {
        write_byte(self.sig_write.as_raw_fd(), if hard { HARD_EXIT } else { SOFT_EXIT });
        match self.join.take().expect("shutdown called twice").join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("server thread panicked")),
        }
    }
}

impl fmt::Debug for BackgroundServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundServer").finish_non_exhaustive()
    }
}

/// Bind and run the server on a background thread, returning immediately.
/// `logger`, if given, is closed and joined as part of this background
/// thread's own shutdown sequence; see [`run`].
pub fn spawn(config: Config, logger: Option<LoggerHandle>) -> io::Result<BackgroundServer> {
    let (sig_read, sig_write) = pipe()?;
    let sig_read_fd = sig_read.as_raw_fd();
    let join = std::thread::Builder::new()
        .name("memfiled-server".into())
        .spawn(move || {
            let _keep_alive = sig_read;
            run_with_signal_pipe(&config, sig_read_fd, logger)
        })?;
    Ok(BackgroundServer {
        sig_write,
        join: Some(join),
    })
}

fn run_with_signal_pipe(
    config: &Config,
    signal_read: RawFd,
    logger: Option<LoggerHandle>,
) -> io::Result<ShutdownReport> {
    let socket_path = PathBuf::from(&config.socketname);
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;

    let (note_read, note_write) = pipe()?;

    let storage = Storage::new(config.max_num_files, config.max_storage_size, config.replacement_policy);
    let registry = Registry::new();
    let ctx = Arc::new(Context::new(
        storage,
        registry.clone(),
        config.enable_compression,
        note_write.as_raw_fd(),
    ));

    let to_workers: Queue<ClientId> = Queue::new();

    let pool = {
        let ctx = ctx.clone();
        let to_workers = to_workers.clone();
        Pool::spawn(config.num_workers, move |_index| {
            worker::run(ctx.clone(), to_workers.clone());
        })
    };

    let mut master = Master::new(listener, signal_read, note_read.as_raw_fd(), to_workers, registry);
    master.run();
    pool.join();

    let report = {
        let storage = ctx.storage.read();
        ShutdownReport {
            stats: storage.stats_snapshot(),
            remaining: storage.remaining(),
        }
    };
    log::info!("shutdown complete:\n{report}");
    if let Some(logger) = logger {
        logger.shutdown();
    }

    let _ = std::fs::remove_file(&socket_path);
    Ok(report)
}
