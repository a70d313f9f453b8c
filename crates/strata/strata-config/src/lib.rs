mod config;
mod send_receive;

pub use config::{BufferSettings, ConfigError, DetectorConfig, StatsSettings, SyncMode, SyncSettings};
pub use send_receive::SendReceiveConfig;
