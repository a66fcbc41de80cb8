//! The logger shim: an unbounded queue of formatted records
//! consumed by one dedicated thread that stamps wall-clock time and
//! persists the result.
//!
//! The rest of the crate never touches this module directly; it uses the
//! ordinary `log::{info, warn, error, debug}` macros. This module only
//! supplies the backend those macros write into.

use std::io::Write;
use std::time::SystemTime;

use log::{Level, Log, Metadata, Record};

use crate::sync::queue::Queue;

struct LogRecord {
    level: Level,
    target: String,
    message: String,
    timestamp: SystemTime,
}

/// A `log::Log` backend that hands every record to a dedicated writer
/// thread over an unbounded queue, never blocking the caller on I/O.
struct QueuedLogger {
    queue: Queue<LogRecord>,
}

impl Log for QueuedLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = self.queue.put(LogRecord {
            level: record.level(),
            target: record.target().to_string(),
            message: format!("{}", record.args()),
            timestamp: SystemTime::now(),
        });
    }

    fn flush(&self) {}
}

/// Install the queued logger as the global `log` backend and spawn its
/// writer thread. The returned [`LoggerHandle`] closes the queue and joins
/// the writer thread when dropped, mirroring how the master loop
/// closes and joins the logger on shutdown.
pub fn install(max_level: log::LevelFilter) -> LoggerHandle {
    let queue = Queue::new();
    let writer_queue = queue.clone();
    let join = std::thread::Builder::new()
        .name("memfiled-logger".into())
        .spawn(move || writer_loop(writer_queue))
        .expect("failed to spawn logger thread");

    log::set_boxed_logger(Box::new(QueuedLogger {
        queue: queue.clone(),
    }))
    .expect("logger already installed");
    log::set_max_level(max_level);

    LoggerHandle {
        queue,
        join: Some(join),
    }
}

fn writer_loop(queue: Queue<LogRecord>) {
    let stderr = std::io::stderr();
    while let Some(record) = queue.get() {
        let mut out = stderr.lock();
        let _ = writeln!(
            out,
            "[{}] {} {}: {}",
            format_timestamp(record.timestamp),
            record.level,
            record.target,
            record.message
        );
    }
}

fn format_timestamp(ts: SystemTime) -> String {
    match ts.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => format!("{}.{:06}", d.as_secs(), d.subsec_micros()),
        Err(_) => "0.000000".to_string(),
    }
}

/// Owns the logger's queue-closing handle and the writer thread's join
/// handle. Dropping it closes the queue (waking the writer) and joins it.
pub struct LoggerHandle {
    queue: Queue<LogRecord>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl LoggerHandle {
    /// Close the log queue and join the writer thread. Called explicitly
    /// by the master loop during shutdown; also run on `Drop`.
    pub fn shutdown(mut self) {
        self.queue.close();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        self.queue.close();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
