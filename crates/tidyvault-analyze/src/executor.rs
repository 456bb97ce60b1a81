//! Pluggable execution of hashing work.
//!
//! The duplicate detector hands each file to a [`HashExecutor`] and later
//! collects the result through a [`HashTicket`]. Backends differ only in
//! where the work runs.

use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use tidyvault_core::ContentHash;

/// A unit of hashing work.
pub type HashTask = Box<dyn FnOnce() -> io::Result<ContentHash> + Send + 'static>;

/// Handle to the result of a submitted [`HashTask`].
pub struct HashTicket {
    rx: oneshot::Receiver<io::Result<ContentHash>>,
}

impl HashTicket {
    fn channel() -> (oneshot::Sender<io::Result<ContentHash>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Block until the task has run.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> io::Result<ContentHash> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(io::Error::other("hash task was abandoned")))
    }
}

/// Where hashing work runs.
pub trait HashExecutor: Send + Sync {
    /// Queue a task and return a handle to its result.
    fn submit(&self, task: HashTask) -> HashTicket;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Runs tasks on a dedicated rayon pool.
pub struct PoolExecutor {
    pool: rayon::ThreadPool,
}

impl PoolExecutor {
    /// Build a pool with `threads` workers (0 = available parallelism).
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let threads = if threads == 0 { default_threads() } else { threads };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tidyvault-hash-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl HashExecutor for PoolExecutor {
    fn submit(&self, task: HashTask) -> HashTicket {
        let (tx, ticket) = HashTicket::channel();
        self.pool.spawn(move || {
            let _ = tx.send(task());
        });
        ticket
    }

    fn name(&self) -> &'static str {
        "pool"
    }
}

/// Runs tasks immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl HashExecutor for InlineExecutor {
    fn submit(&self, task: HashTask) -> HashTicket {
        let (tx, ticket) = HashTicket::channel();
        let _ = tx.send(task());
        ticket
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Pick the best backend this process can run.
///
/// Falls back to [`InlineExecutor`] when worker threads cannot be spawned.
pub fn select_executor(threads: usize) -> Arc<dyn HashExecutor> {
    match PoolExecutor::new(threads) {
        Ok(pool) => {
            debug!("Hashing on a pool of {} threads", pool.threads());
            Arc::new(pool)
        }
        Err(err) => {
            warn!("Cannot start hashing pool ({}), hashing inline", err);
            Arc::new(InlineExecutor)
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(byte: u8) -> HashTask {
        Box::new(move || Ok(ContentHash::new([byte; 32])))
    }

    #[test]
    fn test_inline_runs_immediately() {
        let ticket = InlineExecutor.submit(constant(1));
        assert_eq!(ticket.wait().unwrap(), ContentHash::new([1; 32]));
    }

    #[test]
    fn test_pool_preserves_results_per_ticket() {
        let pool = PoolExecutor::new(2).unwrap();
        let tickets: Vec<_> = (0..16u8).map(|i| pool.submit(constant(i))).collect();

        for (i, ticket) in tickets.into_iter().enumerate() {
            assert_eq!(ticket.wait().unwrap(), ContentHash::new([i as u8; 32]));
        }
    }

    #[test]
    fn test_task_errors_are_returned() {
        let ticket = InlineExecutor.submit(Box::new(|| Err(io::Error::other("boom"))));
        assert!(ticket.wait().is_err());
    }

    #[test]
    fn test_select_executor() {
        let executor = select_executor(1);
        assert!(["pool", "inline"].contains(&executor.name()));
        assert!(executor.submit(constant(3)).wait().is_ok());
    }
}
