//! The worker pool per-record tasks run on.

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

/// A worker pool.
///
/// With zero threads, work runs on rayon's global pool (one thread per
/// core by default).
#[derive(Debug, Default)]
pub struct Workers(Option<ThreadPool>);

impl Workers {
    /// Creates a pool of `threads` workers.
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        match threads {
            0 => Ok(Self(None)),
            n => ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("orfdb-worker-{i}"))
                .build()
                .map(|pool| Self(Some(pool))),
        }
    }

    /// Runs `op` on the pool. Parallel iterators inside `op` use the pool's
    /// workers.
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.0 {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Gets the number of worker threads.
    pub fn threads(&self) -> usize {
        match &self.0 {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}
