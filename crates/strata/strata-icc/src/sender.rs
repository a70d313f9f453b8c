//! Frame producer and consumer endpoints.
//!
//! A named buffer `<name>` under a shared-memory root is two files: the frame
//! buffer `<root>/<name>` and its id channel `<root>/<name>.ids`. [`Sender`]
//! writes a frame into the buffer and then announces its id; [`Receiver`] waits
//! for an announced id and copies the frame back out.

use crate::error::{IccError, RingError};
use crate::notify::{IdPublisher, IdSubscriber, Publisher, Subscriber, channel_path};
use crate::ram_buffer::{BufferConfig, RingBuffer, RingReader, SlotRead};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Frame buffer file and id channel file of the buffer `name` under `root`.
pub fn buffer_paths(root: impl AsRef<Path>, name: &str) -> Result<(PathBuf, PathBuf), IccError> {
    let buffer = strata_mmap::region_path(root, name).map_err(IccError::Name)?;
    let channel = channel_path(&buffer);
    Ok((buffer, channel))
}

pub struct Sender<P: Publisher = IdPublisher> {
    ring: RingBuffer,
    publisher: P,
}

impl Sender<IdPublisher> {
    /// Creates buffer and channel for `name` under `root`, replacing any
    /// leftovers of a previous run.
    pub fn create(root: impl AsRef<Path>, name: &str, cfg: BufferConfig, hwm: usize) -> Result<Self, IccError> {
        let (buffer, channel) = buffer_paths(root, name)?;
        let ring = RingBuffer::create(&buffer, cfg)?;
        let publisher = IdPublisher::create(&channel, hwm)?;
        tracing::info!(
            buffer = %buffer.display(),
            n_slots = cfg.n_slots,
            hwm,
            "sender ready"
        );
        Ok(Self { ring, publisher })
    }
}

impl<P: Publisher> Sender<P> {
    pub fn new(ring: RingBuffer, publisher: P) -> Self {
        Self { ring, publisher }
    }

    /// Stores the frame under `id`, then announces `id`.
    ///
    /// If the announcement fails the frame is still retrievable from the buffer.
    pub fn send(&mut self, id: u64, meta: &[u8], data: &[u8]) -> Result<(), IccError> {
        self.ring.write(id, meta, data)?;
        self.publisher.publish(id)?;
        Ok(())
    }

    /// [`Sender::send`] with the frame assembled in place by `fill`.
    pub fn send_with<F>(&mut self, id: u64, fill: F) -> Result<(), IccError>
    where
        F: FnOnce(&mut [u8], &mut [u8]) -> (usize, usize),
    {
        self.ring.write_with(id, fill)?;
        self.publisher.publish(id)?;
        Ok(())
    }

    pub fn get_data(&self, id: u64) -> Result<Vec<u8>, RingError> {
        self.ring.get_data(id)
    }

    pub fn get_meta(&self, id: u64) -> Result<Vec<u8>, RingError> {
        self.ring.get_meta(id)
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

/// An owned copy of one received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub id: u64,
    pub meta: Vec<u8>,
    pub data: Vec<u8>,
}

pub struct Receiver<S: Subscriber = IdSubscriber> {
    ring: RingReader,
    subscriber: S,
}

impl Receiver<IdSubscriber> {
    /// Attaches to the buffer `name` under `root`. Only frames announced after
    /// this call are received.
    pub fn open(root: impl AsRef<Path>, name: &str) -> Result<Self, IccError> {
        let (buffer, channel) = buffer_paths(root, name)?;
        let subscriber = IdSubscriber::open(&channel)?;
        let ring = RingReader::open(&buffer)?;
        Ok(Self { ring, subscriber })
    }

    /// [`Receiver::open`], waiting up to `timeout` for the sender to appear.
    pub fn open_with_retry(root: impl AsRef<Path>, name: &str, timeout: Duration) -> Result<Self, IccError> {
        let (buffer, channel) = buffer_paths(root, name)?;
        let subscriber = IdSubscriber::open_with_retry(&channel, timeout)?;
        let ring = RingReader::open(&buffer)?;
        Ok(Self { ring, subscriber })
    }
}

impl<S: Subscriber> Receiver<S> {
    pub fn new(ring: RingReader, subscriber: S) -> Self {
        Self { ring, subscriber }
    }

    /// Waits up to `timeout` for the next announced frame and copies it out.
    ///
    /// `None` on timeout. `Some(Err(Stale))` when the frame was overwritten
    /// before it could be read.
    pub fn recv(&mut self, timeout: Duration) -> Option<Result<ReceivedFrame, RingError>> {
        let id = self.subscriber.recv_timeout(timeout)?;
        let frame = self.ring.get_meta(id).and_then(|meta| {
            let data = self.ring.get_data(id)?;
            Ok(ReceivedFrame { id, meta, data })
        });
        Some(frame)
    }

    /// Allocation-free [`Receiver::recv`].
    pub fn recv_into(
        &mut self,
        timeout: Duration,
        meta: &mut [u8],
        data: &mut [u8],
    ) -> Option<Result<SlotRead, RingError>> {
        let id = self.subscriber.recv_timeout(timeout)?;
        Some(self.ring.read_into(id, meta, data))
    }

    /// Announcements lost because this receiver fell behind.
    pub fn missed(&self) -> u64 {
        self.subscriber.missed()
    }

    pub fn ring(&self) -> &RingReader {
        &self.ring
    }

    pub fn subscriber_mut(&mut self) -> &mut S {
        &mut self.subscriber
    }
}
