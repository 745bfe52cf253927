//! Parallel-execution plumbing shared by the batch entry points.
//!
//! Tree construction is single-threaded per tree; only the read-only batch
//! operations (`apply`, `predict_proba`, `weighted_depth`) fan out over
//! rows. Callers pick the pool once with [`run_with_threads`] and thread a
//! [`Parallelism`] flag down to the row loops.

use rayon::prelude::*;

/// Whether a batch loop may fan out over a rayon pool.
///
/// The flag only grants permission; the pool itself is installed by the
/// caller (see [`run_with_threads`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Map a thread-count setting to an execution mode: `1` is sequential,
    /// anything else is parallel except `0` (auto) on a single-thread pool.
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        match n_threads {
            1 => Parallelism::Sequential,
            0 if rayon::current_num_threads() == 1 => Parallelism::Sequential,
            _ => Parallelism::Parallel,
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Apply `f` to every item, on the current rayon pool when parallel.
    #[inline]
    pub fn maybe_par_for_each<T, I, F>(self, iter: I, f: F)
    where
        T: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) + Sync + Send,
    {
        match self {
            Parallelism::Parallel => iter.into_par_iter().for_each(f),
            Parallelism::Sequential => iter.into_iter().for_each(f),
        }
    }

    /// Map every item into a `Vec`, preserving input order in both modes.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        match self {
            Parallelism::Parallel => iter.into_par_iter().map(f).collect(),
            Parallelism::Sequential => iter.into_iter().map(f).collect(),
        }
    }
}

/// Run `f` under the requested thread budget.
///
/// `n_threads == 0` uses all available cores on the ambient pool,
/// `n_threads == 1` skips pool setup entirely, and larger values build a
/// dedicated pool of exactly that many threads.
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .expect("failed to build thread pool")
            .install(|| f(Parallelism::Parallel)),
    }
}
