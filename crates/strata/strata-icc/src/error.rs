use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("failed to map frame buffer '{}'", path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid frame buffer '{}': {reason}", path.display())]
    Layout { path: PathBuf, reason: &'static str },

    #[error("{what} of {len} bytes exceeds slot capacity of {max} bytes")]
    TooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("frame id {0} is reserved for empty slots")]
    ReservedId(u64),

    #[error("slot of frame {expected} is owned by {found:?}")]
    Stale { expected: u64, found: Option<u64> },

    #[error("output buffer of {len} bytes cannot hold {needed} bytes")]
    BufferTooSmall { needed: usize, len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to open notification channel '{}'", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors of the combined buffer + notification endpoints.
#[derive(Debug, thiserror::Error)]
pub enum IccError {
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("invalid buffer name")]
    Name(#[source] io::Error),
}
