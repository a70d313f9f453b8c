//! Frame-id notification channel.
//!
//! Producers announce "frame `id` is now in the buffer" through a [`Publisher`];
//! consumers learn about it through a [`Subscriber`]. The payload is the id
//! alone: everything else is read from the frame buffer.
//!
//! Delivery is best effort. The shared-memory implementation never blocks the
//! publisher, and a subscriber more than the high-water mark behind loses the
//! oldest ids (see [`Subscriber::missed`]).

use crate::broadcast::{BroadcastReader, BroadcastWriter};
use crate::error::NotifyError;
use crate::ring::RingConfig;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Appended to a buffer path to form its channel file.
const CHANNEL_SUFFIX: &str = ".ids";

/// Spins this many times before yielding in [`Subscriber::recv_timeout`].
const SPIN_BEFORE_YIELD: u32 = 64;

pub trait Publisher {
    fn publish(&mut self, id: u64) -> Result<(), NotifyError>;
}

pub trait Subscriber {
    /// Next pending id, without blocking.
    fn try_next(&mut self) -> Option<u64>;

    /// Ids this subscriber never saw because it fell behind.
    fn missed(&self) -> u64;

    /// Waits up to `timeout` for the next id.
    fn recv_timeout(&mut self, timeout: Duration) -> Option<u64> {
        if let Some(id) = self.try_next() {
            return Some(id);
        }
        let deadline = Instant::now() + timeout;
        let mut spins = 0u32;
        loop {
            if let Some(id) = self.try_next() {
                return Some(id);
            }
            if Instant::now() >= deadline {
                return None;
            }
            if spins < SPIN_BEFORE_YIELD {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }
}

impl<P: Publisher + ?Sized> Publisher for &mut P {
    fn publish(&mut self, id: u64) -> Result<(), NotifyError> {
        (**self).publish(id)
    }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, id: u64) -> Result<(), NotifyError> {
        (**self).publish(id)
    }
}

/// Channel file of the buffer at `buffer_path` (`<buffer_path>.ids`).
pub fn channel_path(buffer_path: &Path) -> PathBuf {
    let mut path = buffer_path.as_os_str().to_owned();
    path.push(CHANNEL_SUFFIX);
    PathBuf::from(path)
}

/// Shared-memory [`Publisher`].
pub struct IdPublisher {
    writer: BroadcastWriter<u64>,
}

impl IdPublisher {
    /// Creates the channel file at `path`. `hwm` is rounded up to a power of two.
    pub fn create(path: impl AsRef<Path>, hwm: usize) -> Result<Self, NotifyError> {
        let path = path.as_ref();
        let writer = BroadcastWriter::create(path, RingConfig::at_least(hwm)).map_err(|source| {
            NotifyError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self { writer })
    }

    pub fn published(&self) -> u64 {
        self.writer.published()
    }
}

impl Publisher for IdPublisher {
    #[inline]
    fn publish(&mut self, id: u64) -> Result<(), NotifyError> {
        self.writer.publish(id);
        Ok(())
    }
}

/// Shared-memory [`Subscriber`], tail-following from the moment it opened.
pub struct IdSubscriber {
    reader: BroadcastReader<u64>,
}

impl IdSubscriber {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NotifyError> {
        let path = path.as_ref();
        let reader = BroadcastReader::open(path).map_err(|source| NotifyError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { reader })
    }

    /// Keeps retrying [`IdSubscriber::open`] until the publisher has created the
    /// channel, or `timeout` elapses.
    pub fn open_with_retry(path: impl AsRef<Path>, timeout: Duration) -> Result<Self, NotifyError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::open(path.as_ref()) {
                Ok(s) => return Ok(s),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Subscriber for IdSubscriber {
    #[inline]
    fn try_next(&mut self) -> Option<u64> {
        self.reader.try_read()
    }

    fn missed(&self) -> u64 {
        self.reader.overruns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_lives_next_to_buffer() {
        assert_eq!(
            channel_path(Path::new("/dev/shm/JF07-3")),
            PathBuf::from("/dev/shm/JF07-3.ids")
        );
    }

    #[test]
    fn subscriber_receives_published_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("JF07-0.ids");
        let mut publisher = IdPublisher::create(&path, 16).unwrap();
        let mut subscriber = IdSubscriber::open(&path).unwrap();

        publisher.publish(100).unwrap();
        publisher.publish(101).unwrap();

        assert_eq!(subscriber.recv_timeout(Duration::from_millis(10)), Some(100));
        assert_eq!(subscriber.try_next(), Some(101));
        assert_eq!(subscriber.recv_timeout(Duration::from_millis(2)), None);
        assert_eq!(subscriber.missed(), 0);
    }

    #[test]
    fn hwm_bounds_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids");
        let mut publisher = IdPublisher::create(&path, 3).unwrap();
        let mut subscriber = IdSubscriber::open(&path).unwrap();

        for id in 0..10 {
            publisher.publish(id).unwrap();
        }
        assert_eq!(subscriber.try_next(), Some(6));
        assert_eq!(subscriber.missed(), 6);
    }

    #[test]
    fn open_with_retry_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let err = IdSubscriber::open_with_retry(dir.path().join("absent"), Duration::from_millis(5));
        assert!(matches!(err, Err(NotifyError::Open { .. })));
    }
}
