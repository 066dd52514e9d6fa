//! Execution substrate for data-parallel passes.
//!
//! Every pass is an indexed map or an indexed fold/reduce over `0..n`; the
//! backend decides where the work runs. Scatter steps (several inputs writing
//! the same pixel) are kept out of the backend and run sequentially between
//! passes.

use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{RegistrationError, Result};

/// Where parallel passes execute.
#[derive(Debug, Clone, Default)]
pub enum ComputeBackend {
    /// Plain iterators on the calling thread.
    Serial,
    /// rayon's global thread pool.
    #[default]
    Global,
    /// A dedicated rayon pool.
    Pool(Arc<rayon::ThreadPool>),
}

impl ComputeBackend {
    /// Select a backend from a thread count.
    ///
    /// `0` uses the global pool, `1` runs serially, anything larger builds a
    /// dedicated pool with that many workers.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        match num_threads {
            0 => Ok(Self::Global),
            1 => Ok(Self::Serial),
            n => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("range-icp-{i}"))
                    .build()
                    .map_err(|e| {
                        RegistrationError::config(format!("failed to build thread pool: {e}"))
                    })?;
                Ok(Self::Pool(Arc::new(pool)))
            }
        }
    }

    /// Number of workers the backend uses.
    pub fn num_threads(&self) -> usize {
        match self {
            Self::Serial => 1,
            Self::Global => rayon::current_num_threads(),
            Self::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Evaluate `f(i)` for every `i in 0..n`, preserving index order.
    pub fn map_indexed<T, F>(&self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Self::Serial => (0..n).map(f).collect(),
            Self::Global => (0..n).into_par_iter().map(f).collect(),
            Self::Pool(pool) => pool.install(|| (0..n).into_par_iter().map(f).collect()),
        }
    }

    /// Fold `0..n` into per-worker partials with `fold`, then merge them with
    /// `reduce`. `reduce` must be associative and `identity()` its neutral
    /// element.
    pub fn fold_reduce<T, I, F, R>(&self, n: usize, identity: I, fold: F, reduce: R) -> T
    where
        T: Send,
        I: Fn() -> T + Sync + Send,
        F: Fn(T, usize) -> T + Sync + Send,
        R: Fn(T, T) -> T + Sync + Send,
    {
        match self {
            Self::Serial => (0..n).fold(identity(), fold),
            Self::Global => (0..n)
                .into_par_iter()
                .fold(&identity, &fold)
                .reduce(&identity, &reduce),
            Self::Pool(pool) => pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .fold(&identity, &fold)
                    .reduce(&identity, &reduce)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> Vec<ComputeBackend> {
        vec![
            ComputeBackend::Serial,
            ComputeBackend::Global,
            ComputeBackend::with_threads(3).unwrap(),
        ]
    }

    #[test]
    fn test_with_threads_selection() {
        assert!(matches!(
            ComputeBackend::with_threads(0).unwrap(),
            ComputeBackend::Global
        ));
        assert!(matches!(
            ComputeBackend::with_threads(1).unwrap(),
            ComputeBackend::Serial
        ));
        let pool = ComputeBackend::with_threads(2).unwrap();
        assert_eq!(pool.num_threads(), 2);
    }

    #[test]
    fn test_map_indexed_preserves_order() {
        for backend in backends() {
            let out = backend.map_indexed(1000, |i| i * 2);
            assert_eq!(out.len(), 1000);
            assert!(out.iter().enumerate().all(|(i, &v)| v == i * 2));
        }
    }

    #[test]
    fn test_fold_reduce_sum() {
        for backend in backends() {
            let sum = backend.fold_reduce(1001, || 0u64, |acc, i| acc + i as u64, |a, b| a + b);
            assert_eq!(sum, 500_500);
        }
    }

    #[test]
    fn test_empty_range() {
        for backend in backends() {
            assert!(backend.map_indexed(0, |i| i).is_empty());
            assert_eq!(backend.fold_reduce(0, || 7, |a, _| a + 1, |a, b| a + b), 7);
        }
    }
}
