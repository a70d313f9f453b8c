//! Cooperative shutdown on SIGINT/SIGTERM.
//!
//! Hot loops poll the flag between receive timeouts; nothing is interrupted
//! mid-frame.

use crate::CoreError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Returns a flag that turns `true` once the process is asked to stop.
///
/// Can be installed once per process.
pub fn stop_on_signal() -> Result<Arc<AtomicBool>, CoreError> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        flag.store(true, Ordering::SeqCst);
    })?;
    Ok(stop)
}

#[inline]
pub fn requested(stop: &AtomicBool) -> bool {
    stop.load(Ordering::Relaxed)
}
