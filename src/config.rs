//! Runtime configuration read from the environment.

use std::env;
use std::num::NonZeroUsize;
use std::thread;

use log::warn;

/// Environment variable holding the default worker count for parallel drivers.
pub const NUM_THREADS_ENV: &str = "ADTAPE_NUM_THREADS";

/// Settings for [`Tape::par_jacobian`](crate::Tape::par_jacobian).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Number of worker threads; always at least 1.
    pub num_workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            num_workers: available_workers(),
        }
    }
}

impl ParallelConfig {
    /// Use exactly `num_workers` threads (0 becomes 1).
    pub fn with_workers(num_workers: usize) -> Self {
        ParallelConfig {
            num_workers: num_workers.max(1),
        }
    }

    /// Read [`NUM_THREADS_ENV`]; fall back to the machine's available
    /// parallelism when it is unset or not a positive integer.
    pub fn from_env() -> Self {
        Self::from_value(env::var(NUM_THREADS_ENV).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::default(),
            Some(s) => match s.parse::<NonZeroUsize>() {
                Ok(n) => Self::with_workers(n.get()),
                Err(e) => {
                    warn!("ignoring {}={:?}: {}", NUM_THREADS_ENV, s, e);
                    Self::default()
                }
            },
        }
    }
}

fn available_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
