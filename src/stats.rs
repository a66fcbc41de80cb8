//! Server statistics: monotone counters plus the
//! shutdown report format (`original_source/src/server.c` prints one
//! line per remaining blob after the aggregate counters; we keep that
//! shape in [`ShutdownReport`]'s `Display` impl).

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub peak_bytes: u64,
    pub peak_blobs: usize,
    pub eviction_count: u64,
}

/// Everything printed when the server shuts down: the aggregate
/// counters plus one `name size` line per blob still resident.
pub struct ShutdownReport {
    pub stats: Statistics,
    pub remaining: Vec<(Vec<u8>, usize)>,
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "peak_bytes={}", self.stats.peak_bytes)?;
        writeln!(f, "peak_blobs={}", self.stats.peak_blobs)?;
        writeln!(f, "eviction_count={}", self.stats.eviction_count)?;
        for (name, size) in &self.remaining {
            writeln!(f, "{} {}", String::from_utf8_lossy(name), size)?;
        }
        Ok(())
    }
}
