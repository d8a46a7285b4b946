//! Bounded worker pool shared by every fan-out in a run.
//!
//! All parallel work (assets within a backtest, parameter sets within an
//! optimization) runs inside `WorkerPool::install`, so nested `par_iter`
//! calls draw from one thread budget instead of multiplying it.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Number of workers used when none is configured: the available cores.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::ZeroWorkers);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("algame-worker-{i}"))
            .build()?;
        Ok(Self {
            pool: Arc::new(pool),
            workers,
        })
    }

    pub fn with_default_workers() -> Result<Self, PoolError> {
        Self::new(default_workers())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `op` inside the pool. Parallel iterators started by `op` use this pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(PoolError::ZeroWorkers)));
    }

    #[test]
    fn install_uses_pool_threads() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.workers(), 2);
        let threads = pool.install(rayon::current_num_threads);
        assert_eq!(threads, 2);
    }

    #[test]
    fn nested_parallelism_stays_in_pool() {
        let pool = WorkerPool::new(3).unwrap();
        let total: usize = pool.install(|| {
            (0..4)
                .into_par_iter()
                .map(|_| {
                    assert_eq!(rayon::current_num_threads(), 3);
                    (0..10).into_par_iter().sum::<usize>()
                })
                .sum()
        });
        assert_eq!(total, 4 * 45);
    }

    #[test]
    fn clones_share_the_pool() {
        let pool = WorkerPool::new(1).unwrap();
        let clone = pool.clone();
        assert!(Arc::ptr_eq(&pool.pool, &clone.pool));
    }
}
