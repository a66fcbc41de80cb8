//! memfiled: a concurrent in-memory file storage server.
//!
//! Clients connect over a Unix domain stream socket and speak the binary
//! protocol described in [`wire`]: open, read, write, append, lock,
//! unlock and remove named blobs held entirely in memory, subject to a
//! configurable blob-count and byte-size budget enforced by eviction.
//! See [`server::run`] and [`server::spawn`] for the
//! two top-level entry points, and [`config::Config`] for how a server
//! is configured.

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod signals;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod wire;

mod client;
mod context;
mod dispatch;
mod master;
mod notify;
mod pool;
mod registry;
mod worker;
