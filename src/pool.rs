//! The worker pool: a fixed set of threads, each running the
//! same entry point against a shared, immutable context.

use std::thread::JoinHandle;

pub struct Pool {
    threads: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Spawn `count` threads, each running `entry(worker_index)`.
    pub fn spawn<F>(count: usize, entry: F) -> Pool
    where
        F: Fn(usize) + Send + Clone + 'static,
    {
        let threads = (0..count)
            .map(|index| {
                let entry = entry.clone();
                std::thread::Builder::new()
                    .name(format!("memfiled-worker-{index}"))
                    .spawn(move || entry(index))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Pool { threads }
    }

    /// Join every worker thread. The caller is responsible for having
    /// already closed the master->workers queue so each thread's loop
    /// can observe `None` and return.
    pub fn join(self) {
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}
