//! Process plumbing shared by the strata binaries.

pub mod logging;
pub mod shutdown;
mod ticker;

pub use ticker::Ticker;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid log filter '{filter}'")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to install log subscriber")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to install signal handler")]
    Signal(#[from] ctrlc::Error),
}
