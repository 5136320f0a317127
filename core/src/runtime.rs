//! Global worker pool used when generating remap tables.

use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

use crate::{Error, Result};

/// Environment variable consulted when no explicit thread count is given.
pub const CPU_THREADS_ENV: &str = "RUSTCV_CPU_THREADS";

static POOL_INIT: OnceLock<std::result::Result<usize, String>> = OnceLock::new();

/// Initialize the global Rayon pool and return its worker count.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `RUSTCV_CPU_THREADS` environment variable
/// 3. Rayon default
///
/// Only the first call configures the pool; later calls return the first
/// outcome unchanged.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<usize> {
    let res = POOL_INIT.get_or_init(|| {
        let requested = match num_threads {
            Some(n) => Some(n),
            None => threads_from_env()?,
        };

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("calib-remap-{i}"));
        if let Some(n) = requested {
            if n == 0 {
                return Err(format!("{CPU_THREADS_ENV} must be >= 1"));
            }
            builder = builder.num_threads(n);
        }

        builder.build_global().map_err(|e| e.to_string())?;
        Ok(rayon::current_num_threads())
    });
    res.clone().map_err(Error::InvalidParameters)
}

/// Number of workers the remap generators will fan out to.
pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn threads_from_env() -> std::result::Result<Option<usize>, String> {
    let raw = match env::var(CPU_THREADS_ENV) {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => return Err(format!("failed to read {CPU_THREADS_ENV}: {e}")),
    };

    match raw.trim().parse::<usize>() {
        Ok(0) => Err(format!("{CPU_THREADS_ENV} must be >= 1")),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(format!(
            "{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"
        )),
    }
}
