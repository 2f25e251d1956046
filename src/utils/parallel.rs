//! Parallel processing utilities

use crate::error::{ForecastError, Result};

/// Run `op` on a rayon pool bounded to `n_jobs` threads.
///
/// With `None` the global pool is used.
pub fn install<T, F>(n_jobs: Option<usize>, op: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match n_jobs {
        Some(0) => Err(ForecastError::invalid_parameter(
            "n_jobs",
            0,
            "must be positive",
        )),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ForecastError::ConfigError(format!("Thread pool error: {}", e)))?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}
