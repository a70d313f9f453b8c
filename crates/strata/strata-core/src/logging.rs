use crate::CoreError;
use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (the config's
/// `log_level`, e.g. `"info"` or `"udp_recv_engine=debug,info"`) is used.
pub fn init(default_level: &str) -> Result<(), CoreError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|source| CoreError::Filter {
            filter: default_level.to_string(),
            source,
        })?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(CoreError::Subscriber)
}
