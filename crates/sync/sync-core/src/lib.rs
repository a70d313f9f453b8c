mod modules;
mod retry;
mod stats;
mod window;

pub use modules::{ModuleSynchronizer, SyncedImage};
pub use retry::{RetryPolicy, SyncError};
pub use stats::{SyncReport, SyncStats};
pub use window::Synchronizer;
