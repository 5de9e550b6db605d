//! Declaration-site runtime bridge.
//!
//! Declarations usually happen in synchronous code, while composition and
//! registration are async. [`block_on`] drives a future to completion on a
//! process-wide Tokio runtime that is built on first use and torn down by
//! [`shutdown`].

use std::future::Future;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::errors::{AssetError, Result};

static BRIDGE: Lazy<Mutex<Option<Runtime>>> = Lazy::new(|| Mutex::new(None));

fn bridge_handle() -> Result<Handle> {
    let mut slot = BRIDGE.lock();
    if let Some(runtime) = slot.as_ref() {
        return Ok(runtime.handle().clone());
    }

    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("asset-forge-bridge")
        .enable_all()
        .build()
        .map_err(|e| AssetError::Bridge {
            message: format!("failed to start bridge runtime: {e}"),
        })?;
    let handle = runtime.handle().clone();
    *slot = Some(runtime);
    log::debug!("[runtime] bridge runtime started");
    Ok(handle)
}

/// Drive `future` to completion from synchronous code.
///
/// When called from inside another runtime the future is driven on a scoped
/// helper thread, since blocking a runtime thread on itself would panic.
pub fn block_on<F>(future: F) -> Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    let handle = bridge_handle()?;
    if Handle::try_current().is_ok() {
        std::thread::scope(|scope| {
            scope
                .spawn(|| handle.block_on(future))
                .join()
                .map_err(|_| AssetError::Bridge {
                    message: "bridged future panicked".to_string(),
                })
        })
    } else {
        Ok(handle.block_on(future))
    }
}

/// Whether the bridge runtime is currently running.
pub fn is_running() -> bool {
    BRIDGE.lock().is_some()
}

/// Tear the bridge down. Pending tasks are dropped; a later [`block_on`]
/// starts a fresh runtime.
pub fn shutdown() {
    if let Some(runtime) = BRIDGE.lock().take() {
        runtime.shutdown_background();
        log::debug!("[runtime] bridge runtime shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_from_sync_code() {
        let value = block_on(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
        assert!(is_running());
    }

    #[tokio::test]
    async fn test_block_on_inside_a_runtime() {
        let value = block_on(async { "nested" }).unwrap();
        assert_eq!(value, "nested");
    }

    #[test]
    fn test_block_on_under_current_thread_runtime() {
        let value = tokio_test::block_on(async { block_on(async { 7 }).unwrap() });
        assert_eq!(value, 7);
    }
}
