//! Sync process: module frame announcements in, image records out.
//!
//! ```text
//! <det>-0 ids --\
//! <det>-1 ids ---+--> meta read --> Reconciler --> <det>-image (ImageMeta)
//! <det>-N ids --/                       |
//!                                RetryPolicy, SyncStats
//! ```
//!
//! Every released image is written to the `<det>-image` buffer as an
//! [`ImageMeta`] record (id, good or missing-packets status, image shape) and
//! its id announced on that buffer's channel. Consumers read the module
//! payloads of a released image from the per-module buffers.

mod reconciler;

pub use reconciler::Reconciler;

use std::sync::atomic::AtomicBool;
use std::time::Duration;
use strata_config::{ConfigError, DetectorConfig, SyncMode};
use strata_core::shutdown;
use strata_detectors::{CommonFrame, FRAME_META_BYTES, IMAGE_META_BYTES, ImageMeta, ImageStatus};
use strata_icc::{BufferConfig, IccError, IdPublisher, IdSubscriber, NotifyError, Publisher, Receiver, Sender, Subscriber};
use sync_core::{ModuleSynchronizer, RetryPolicy, SyncError, SyncStats, SyncedImage, Synchronizer};

/// How long startup waits for the module receivers to create their buffers.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Ids taken from one module channel per poll, so no stream starves the others.
const MAX_IDS_PER_STREAM: usize = 256;

/// Sleep of an idle poll loop.
const IDLE_SLEEP: Duration = Duration::from_micros(100);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Icc(#[from] IccError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<NotifyError> for EngineError {
    fn from(e: NotifyError) -> Self {
        EngineError::Icc(e.into())
    }
}

/// One module's announcements and buffer.
pub struct ModuleStream<S: Subscriber = IdSubscriber> {
    module_id: u16,
    /// Module id the receiver writes into its frame records.
    record_module_id: u16,
    receiver: Receiver<S>,
    missed: u64,
}

impl<S: Subscriber> ModuleStream<S> {
    pub fn new(module_id: u16, receiver: Receiver<S>) -> Self {
        let missed = receiver.missed();
        Self {
            module_id,
            record_module_id: module_id,
            receiver,
            missed,
        }
    }

    /// Expect frame records stamped with `record_module_id` (see
    /// `FrameGeometry::record_module_id`).
    pub fn with_record_module_id(mut self, record_module_id: u16) -> Self {
        self.record_module_id = record_module_id;
        self
    }

    pub fn module_id(&self) -> u16 {
        self.module_id
    }
}

/// Slot layout of the `<det>-image` buffer: one record per image, no payload.
pub fn image_buffer_config(n_slots: usize) -> BufferConfig {
    BufferConfig {
        n_slots,
        meta_bytes: IMAGE_META_BYTES,
        data_bytes: 0,
    }
}

pub struct SyncEngine<S: Subscriber = IdSubscriber, P: Publisher = IdPublisher> {
    streams: Vec<ModuleStream<S>>,
    reconciler: Reconciler,
    images: Sender<P>,
    /// Shape fields of every published record; id and status are set per image.
    image: ImageMeta,
    retry: RetryPolicy,
    stats: SyncStats,
    released: Vec<SyncedImage>,
    n_released: u64,
    n_given_up: u64,
}

impl SyncEngine<IdSubscriber, IdPublisher> {
    /// Attaches to every synchronized module buffer and creates the image
    /// buffer, all under the configured shared-memory root.
    pub fn from_config(config: &DetectorConfig) -> Result<Self, EngineError> {
        let root = &config.buffer.shm_root;
        let modules = config.sync_modules();
        if modules.is_empty() {
            return Err(ConfigError::Invalid("no module to synchronize".into()).into());
        }

        let geometry = config.geometry()?;
        let mut streams = Vec::new();
        for module_id in modules {
            let name = config.module_buffer_name(module_id);
            let receiver = Receiver::open_with_retry(root, &name, OPEN_TIMEOUT)?;
            tracing::debug!(module_id, buffer = %name, "attached to module buffer");
            streams.push(
                ModuleStream::new(module_id, receiver)
                    .with_record_module_id(geometry.record_module_id(module_id)),
            );
        }

        let image_buffer = config.image_buffer_name();
        let images = Sender::create(
            root,
            &image_buffer,
            image_buffer_config(config.buffer.n_buffer_slots),
            config.buffer.notify_hwm,
        )?;
        let image = ImageMeta {
            height: config.image_pixel_height,
            width: config.image_pixel_width,
            bit_depth: config.bit_depth,
            ..Default::default()
        };

        let reconciler = match config.sync.mode {
            SyncMode::Modules => Reconciler::Modules(ModuleSynchronizer::new(
                config.sync_mask(),
                config.sync.n_images_buffer,
            )),
            SyncMode::Window => Reconciler::Window(Synchronizer::new(config.sync.drop_after)),
        };
        let stats = SyncStats::new(
            config.detector_name.clone(),
            Duration::from_secs(config.stats.period_secs),
        );

        tracing::info!(
            detector_name = %config.detector_name,
            mode = ?config.sync.mode,
            n_streams = streams.len(),
            image_buffer = %image_buffer,
            retry_limit = config.sync.retry_limit,
            "sync configured"
        );
        Ok(Self::new(
            streams,
            reconciler,
            images,
            image,
            RetryPolicy::new(config.sync.retry_limit),
            stats,
        ))
    }
}

impl<S: Subscriber, P: Publisher> SyncEngine<S, P> {
    pub fn new(
        streams: Vec<ModuleStream<S>>,
        reconciler: Reconciler,
        images: Sender<P>,
        image: ImageMeta,
        retry: RetryPolicy,
        stats: SyncStats,
    ) -> Self {
        Self {
            streams,
            reconciler,
            images,
            image,
            retry,
            stats,
            released: Vec::new(),
            n_released: 0,
            n_given_up: 0,
        }
    }

    /// Runs until `stop` is set or the streams are found desynchronized.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), EngineError> {
        tracing::info!(n_streams = self.streams.len(), "sync running");
        let result = loop {
            if shutdown::requested(stop) {
                break Ok(());
            }
            match self.poll() {
                Ok(0) => std::thread::sleep(IDLE_SLEEP),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        tracing::info!(
            released = self.n_released,
            given_up = self.n_given_up,
            pending = self.reconciler.pending(),
            "sync stopped"
        );
        result
    }

    /// Drains the module channels once; returns how many module frames were
    /// processed.
    pub fn poll(&mut self) -> Result<usize, EngineError> {
        let mut processed = 0;
        let mut given_up = 0;
        let mut meta = [0u8; FRAME_META_BYTES];

        for stream in &mut self.streams {
            let missed = stream.receiver.missed();
            for _ in stream.missed..missed {
                self.stats.record_lost();
            }
            if missed > stream.missed {
                tracing::warn!(
                    module_id = stream.module_id,
                    missed = missed - stream.missed,
                    "sync fell behind module announcements"
                );
            }
            stream.missed = missed;

            for _ in 0..MAX_IDS_PER_STREAM {
                let Some(id) = stream.receiver.subscriber_mut().try_next() else {
                    break;
                };
                let frame = match stream.receiver.ring().read_meta_into(id, &mut meta) {
                    Ok(read) => CommonFrame::decode(&meta[..read.meta_len]),
                    Err(error) => {
                        self.stats.record_lost();
                        tracing::debug!(module_id = stream.module_id, frame_id = id, %error, "module frame lost");
                        continue;
                    }
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(error) => {
                        self.stats.record_lost();
                        tracing::warn!(module_id = stream.module_id, frame_id = id, %error, "unreadable frame record");
                        continue;
                    }
                };
                if frame.module_id != stream.record_module_id {
                    tracing::warn!(
                        expected = stream.record_module_id,
                        found = frame.module_id,
                        frame_id = id,
                        "frame of another module in buffer"
                    );
                }

                given_up += self.reconciler.process(
                    frame.frame_id,
                    stream.module_id,
                    frame.missing_packets,
                    &mut self.released,
                );
                processed += 1;
            }
        }

        self.stats.record_corrupted(given_up);
        self.n_given_up += given_up as u64;

        let released = self.released.len();
        for image in self.released.drain(..) {
            let record = ImageMeta {
                image_id: image.image_id,
                status: ImageStatus::from_missing(image.n_missing_packets),
                n_missing_packets: image.n_missing_packets,
                ..self.image
            };
            if let Err(error) = self.images.send(image.image_id, &record.encode(), &[]) {
                tracing::warn!(image_id = image.image_id, %error, "failed to publish image");
            }
            self.stats.record_released(image.n_missing_packets);
        }
        self.n_released += released as u64;

        if released > 0 {
            self.retry.record_success();
        } else if given_up > 0 {
            self.retry.record_failure()?;
        }

        self.stats.maybe_report();
        Ok(processed)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Writer of the `<det>-image` buffer.
    pub fn images(&self) -> &Sender<P> {
        &self.images
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Images released since start.
    pub fn released(&self) -> u64 {
        self.n_released
    }

    /// Images given up on since start.
    pub fn given_up(&self) -> u64 {
        self.n_given_up
    }
}
