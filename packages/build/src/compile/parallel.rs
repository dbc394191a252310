// Worker Pool
//
// A dedicated rayon pool for resource sub-builds. The pool is torn down
// explicitly when a watch session ends; after that, work runs on the
// calling thread.

use super::CompileError;
use rayon::prelude::*;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub struct WorkerPool {
    pool: Mutex<Option<rayon::ThreadPool>>,
}

impl WorkerPool {
    /// Starts a pool with `num_threads` workers, or one per core.
    pub fn new(num_threads: Option<usize>) -> Result<Self, CompileError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|index| format!("ng-resource-{}", index));
        if let Some(num_threads) = num_threads {
            builder = builder.num_threads(num_threads);
        }
        let pool = builder.build()?;
        debug!(threads = pool.current_num_threads(), "started worker pool");
        Ok(WorkerPool {
            pool: Mutex::new(Some(pool)),
        })
    }

    /// Applies `f` to every item, preserving order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let guard = self.lock();
        match guard.as_ref() {
            Some(pool) => pool.install(|| items.par_iter().map(&f).collect()),
            None => items.iter().map(f).collect(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Stops the workers. Fails when the pool was already shut down.
    pub fn shutdown(&self) -> Result<(), CompileError> {
        match self.lock().take() {
            Some(pool) => {
                drop(pool);
                debug!("worker pool shut down");
                Ok(())
            }
            None => Err(CompileError::PoolShutDown),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<rayon::ThreadPool>> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
