//! Blocking adapter over the async core.
//!
//! Synchronous callers get a dedicated multi-thread runtime whose worker pool
//! is sized to the configured concurrency. Inside an existing tokio runtime
//! the adapter refuses with [`Error::NestedRuntime`].

use std::future::Future;

use tokio::runtime::Handle;

use crate::error::{Error, Result};

/// Drive `future` to completion on a fresh runtime with `workers` threads
pub fn block_on<F: Future>(workers: usize, future: F) -> Result<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(Error::NestedRuntime);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers.clamp(1, 64))
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_runs_future() {
        let value = block_on(2, async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_block_on_supports_timers() {
        let value = block_on(1, async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            "done"
        })
        .unwrap();
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_block_on_inside_runtime_is_an_error() {
        let result = block_on(1, async { 1 });
        assert!(matches!(result, Err(Error::NestedRuntime)));
    }
}
