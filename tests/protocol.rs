//! End-to-end protocol tests: drive a real server over a Unix socket
//! with plain `UnixStream` clients rather than unit-testing its pieces
//! in isolation.

use std::os::unix::net::UnixStream;
use std::time::Duration;

use tempfile::TempDir;

use memfiled::config::Config;
use memfiled::error::ErrorCode;
use memfiled::server::{self, BackgroundServer};
use memfiled::storage::EvictionPolicy;
use memfiled::wire::{read_packet, write_packet, OpenFlags, Packet};

struct Harness {
    _dir: TempDir,
    server: Option<BackgroundServer>,
    socketname: String,
}

impl Harness {
    fn start(max_blobs: usize, max_bytes: u64, policy: EvictionPolicy) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let socketname = dir.path().join("memfiled.sock").to_str().unwrap().to_string();
        let config = Config {
            num_workers: 4,
            max_num_files: max_blobs,
            max_storage_size: max_bytes,
            enable_compression: false,
            socketname: socketname.clone(),
            replacement_policy: policy,
        };
        let server = server::spawn(config, None).expect("server failed to start");
        // give the acceptor a moment to bind and start polling
        std::thread::sleep(Duration::from_millis(50));
        Harness {
            _dir: dir,
            server: Some(server),
            socketname,
        }
    }

    fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.socketname).expect("failed to connect")
    }

    fn shutdown(mut self, hard: bool) -> memfiled::stats::ShutdownReport {
        self.server.take().unwrap().shutdown(hard).expect("server did not shut down cleanly")
    }
}

fn send(stream: &mut UnixStream, packet: Packet) {
    write_packet(stream, &packet, false).expect("write failed");
}

fn recv(stream: &mut UnixStream) -> Packet {
    read_packet(stream).expect("read failed")
}

#[test]
fn basic_write_then_read() {
    let h = Harness::start(3, 100, EvictionPolicy::Fifo);
    let mut c1 = h.connect();

    send(
        &mut c1,
        Packet::OpenFile {
            name: b"a".to_vec(),
            // WRITE_FILE requires the caller to hold the lock.
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);

    send(
        &mut c1,
        Packet::WriteFile {
            name: b"a".to_vec(),
            data: vec![b'X'; 50],
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);

    send(&mut c1, Packet::ReadFile(b"a".to_vec()));
    assert_eq!(recv(&mut c1), Packet::Data(vec![b'X'; 50]));

    drop(c1);
    h.shutdown(true);
}

#[test]
fn lock_conflict_leaves_holder_unaffected() {
    let h = Harness::start(3, 100, EvictionPolicy::Fifo);
    let mut c1 = h.connect();
    let mut c2 = h.connect();

    send(
        &mut c1,
        Packet::OpenFile {
            name: b"a".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);

    send(
        &mut c2,
        Packet::OpenFile {
            name: b"a".to_vec(),
            flags: OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c2), Packet::Error(ErrorCode::FileAlreadyLocked));

    // c1 still holds the lock: its own write should succeed.
    send(
        &mut c1,
        Packet::WriteFile {
            name: b"a".to_vec(),
            data: b"ok".to_vec(),
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);

    drop(c1);
    drop(c2);
    h.shutdown(true);
}

#[test]
fn eviction_streams_victim_to_requester() {
    let h = Harness::start(3, 100, EvictionPolicy::Fifo);
    let mut c1 = h.connect();
    let mut c2 = h.connect();

    send(
        &mut c1,
        Packet::OpenFile {
            name: b"a".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);
    send(
        &mut c1,
        Packet::WriteFile {
            name: b"a".to_vec(),
            data: vec![b'A'; 70],
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);

    send(
        &mut c2,
        Packet::OpenFile {
            name: b"b".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c2), Packet::Comp);

    // "b" at 50 bytes plus "a" at 70 exceeds max_bytes=100: "a" must be
    // evicted to make room, and streamed back to c2 before c2's COMP.
    send(
        &mut c2,
        Packet::WriteFile {
            name: b"b".to_vec(),
            data: vec![b'B'; 50],
        },
    );
    assert_eq!(
        recv(&mut c2),
        Packet::FileP {
            name: b"a".to_vec(),
            data: vec![b'A'; 70],
        }
    );
    assert_eq!(recv(&mut c2), Packet::Comp);

    send(&mut c2, Packet::ReadFile(b"b".to_vec()));
    assert_eq!(recv(&mut c2), Packet::Data(vec![b'B'; 50]));

    send(&mut c1, Packet::ReadFile(b"a".to_vec()));
    assert_eq!(recv(&mut c1), Packet::Error(ErrorCode::FileDoesNotExist));

    drop(c1);
    drop(c2);
    h.shutdown(true);
}

#[test]
fn lock_wait_queue_is_fifo() {
    let h = Harness::start(3, 100, EvictionPolicy::Fifo);
    let mut c1 = h.connect();
    let mut c2 = h.connect();
    let mut c3 = h.connect();

    send(
        &mut c1,
        Packet::OpenFile {
            name: b"a".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);

    send(&mut c2, Packet::LockFile(b"a".to_vec()));
    send(&mut c3, Packet::LockFile(b"a".to_vec()));
    // both queued; give the workers a moment to park them before unlocking.
    std::thread::sleep(Duration::from_millis(50));

    send(&mut c1, Packet::UnlockFile(b"a".to_vec()));
    assert_eq!(recv(&mut c1), Packet::Comp);
    assert_eq!(recv(&mut c2), Packet::Comp);

    send(&mut c2, Packet::UnlockFile(b"a".to_vec()));
    assert_eq!(recv(&mut c2), Packet::Comp);
    assert_eq!(recv(&mut c3), Packet::Comp);

    drop(c1);
    drop(c2);
    drop(c3);
    h.shutdown(true);
}

#[test]
fn disconnect_releases_a_queued_waiter() {
    let h = Harness::start(3, 100, EvictionPolicy::Fifo);
    let mut c1 = h.connect();
    let mut c2 = h.connect();

    send(
        &mut c1,
        Packet::OpenFile {
            name: b"a".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);

    send(&mut c2, Packet::LockFile(b"a".to_vec()));
    std::thread::sleep(Duration::from_millis(50));

    drop(c1);
    assert_eq!(recv(&mut c2), Packet::Comp);

    drop(c2);
    h.shutdown(true);
}

#[test]
fn lfu_eviction_picks_least_used() {
    let h = Harness::start(3, 100, EvictionPolicy::Lfu);
    let mut c1 = h.connect();
    let mut c2 = h.connect();

    send(
        &mut c1,
        Packet::OpenFile {
            name: b"a".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);
    send(
        &mut c1,
        Packet::WriteFile {
            name: b"a".to_vec(),
            data: vec![b'A'; 30],
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);
    send(&mut c1, Packet::UnlockFile(b"a".to_vec()));
    assert_eq!(recv(&mut c1), Packet::Comp);

    send(
        &mut c1,
        Packet::OpenFile {
            name: b"b".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);
    send(
        &mut c1,
        Packet::WriteFile {
            name: b"b".to_vec(),
            data: vec![b'B'; 30],
        },
    );
    assert_eq!(recv(&mut c1), Packet::Comp);
    send(&mut c1, Packet::UnlockFile(b"b".to_vec()));
    assert_eq!(recv(&mut c1), Packet::Comp);

    for _ in 0..3 {
        send(&mut c1, Packet::ReadFile(b"b".to_vec()));
        assert_eq!(recv(&mut c1), Packet::Data(vec![b'B'; 30]));
    }

    // "a" has use_count 0, "b" has use_count 3: creating "c" with enough
    // bytes to force an eviction must take "a", not "b".
    send(
        &mut c2,
        Packet::OpenFile {
            name: b"c".to_vec(),
            flags: OpenFlags::CREATE | OpenFlags::LOCK,
        },
    );
    assert_eq!(recv(&mut c2), Packet::Comp);
    send(
        &mut c2,
        Packet::WriteFile {
            name: b"c".to_vec(),
            data: vec![b'C'; 50],
        },
    );
    assert_eq!(
        recv(&mut c2),
        Packet::FileP {
            name: b"a".to_vec(),
            data: vec![b'A'; 30],
        }
    );
    assert_eq!(recv(&mut c2), Packet::Comp);

    send(&mut c1, Packet::ReadFile(b"b".to_vec()));
    assert_eq!(recv(&mut c1), Packet::Data(vec![b'B'; 30]));

    drop(c1);
    drop(c2);
    h.shutdown(true);
}
