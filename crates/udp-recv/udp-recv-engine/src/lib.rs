//! Receive loop of one detector module: datagrams in, frames out.
//!
//! ```text
//! PacketSource --batch--> FrameAssembler --frame--> Sender (buffer write + id publish)
//!                              |
//!                          FrameStats
//! ```

use std::io;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use strata_config::{ConfigError, DetectorConfig, SendReceiveConfig};
use strata_core::shutdown;
use strata_detectors::FrameMeta;
use strata_icc::{IccError, IdPublisher, Publisher, Sender};
use udp_recv_core::{FrameAssembler, FrameStats, PacketSource, UdpPacketReceiver, UdpReceiverConfig};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Icc(#[from] IccError),

    #[error("failed to bind UDP port {port}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to receive datagrams")]
    Receive(#[source] io::Error),
}

pub struct UdpRecvEngine<S: PacketSource, P: Publisher = IdPublisher> {
    source: S,
    assembler: FrameAssembler,
    sender: Sender<P>,
    stats: FrameStats,
    send_errors: u64,
}

impl UdpRecvEngine<UdpPacketReceiver, IdPublisher> {
    /// Binds the module's port and creates its buffer under the configured
    /// shared-memory root.
    pub fn from_config(config: &DetectorConfig, module_id: u16) -> Result<Self, EngineError> {
        let rc = SendReceiveConfig::for_module(config, module_id)?;
        let geometry = config.geometry()?;

        let sender = Sender::create(&rc.shm_root, &rc.buffer_name, rc.buffer_config(), rc.notify_hwm)?;
        let source = UdpPacketReceiver::bind(&UdpReceiverConfig {
            port: rc.udp_port,
            packet_bytes: rc.packet_bytes,
            batch_packets: config.buffer.recv_batch_packets.unwrap_or(rc.packets_per_frame),
            timeout: Duration::from_millis(config.buffer.udp_timeout_ms),
            rcvbuf_bytes: config.buffer.udp_rcvbuf_bytes,
        })
        .map_err(|source| EngineError::Bind {
            port: rc.udp_port,
            source,
        })?;
        let stats = FrameStats::new(
            config.detector_name.clone(),
            module_id,
            Duration::from_secs(config.stats.period_secs),
        );

        tracing::info!(
            detector_name = %config.detector_name,
            module_id,
            family = %rc.family,
            port = rc.udp_port,
            buffer = %rc.buffer_name,
            packets_per_frame = rc.packets_per_frame,
            frame_bytes = rc.data_bytes,
            "udp receiver configured"
        );
        Ok(Self::new(source, FrameAssembler::new(geometry, module_id), sender, stats))
    }
}

impl<S: PacketSource, P: Publisher> UdpRecvEngine<S, P> {
    pub fn new(source: S, assembler: FrameAssembler, sender: Sender<P>, stats: FrameStats) -> Self {
        Self {
            source,
            assembler,
            sender,
            stats,
            send_errors: 0,
        }
    }

    /// Runs until `stop` is set, then emits the frame still in progress.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), EngineError> {
        tracing::info!(module_id = self.assembler.module_id(), "udp receiver running");
        while !shutdown::requested(stop) {
            self.poll()?;
        }
        self.flush();
        let counters = self.assembler.counters();
        tracing::info!(
            module_id = self.assembler.module_id(),
            frames = counters.frames,
            dropped_packets = counters.dropped(),
            send_errors = self.send_errors,
            "udp receiver stopped"
        );
        Ok(())
    }

    /// Processes one batch of datagrams; returns how many were received.
    pub fn poll(&mut self) -> Result<usize, EngineError> {
        let n = self.source.receive_many().map_err(EngineError::Receive)?;
        let Self {
            source,
            assembler,
            sender,
            stats,
            send_errors,
        } = self;
        for i in 0..n {
            let disposition = assembler.push(source.packet(i), |meta, data| {
                emit(sender, stats, send_errors, meta, data)
            });
            if disposition.is_dropped() {
                stats.record_dropped();
            }
        }
        stats.maybe_report();
        Ok(n)
    }

    /// Emits the frame in progress, however incomplete.
    pub fn flush(&mut self) -> bool {
        let Self {
            assembler,
            sender,
            stats,
            send_errors,
            ..
        } = self;
        assembler.flush(|meta, data| emit(sender, stats, send_errors, meta, data))
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    pub fn sender(&self) -> &Sender<P> {
        &self.sender
    }

    /// Frames that could not be written or announced.
    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }
}

fn emit<P: Publisher>(
    sender: &mut Sender<P>,
    stats: &mut FrameStats,
    send_errors: &mut u64,
    meta: &FrameMeta,
    data: &[u8],
) {
    let id = meta.common.frame_id;
    if let Err(error) = sender.send(id, &meta.encode(), data) {
        *send_errors += 1;
        tracing::warn!(frame_id = id, %error, "failed to send frame");
    }
    if meta.common.missing_packets > 0 {
        tracing::debug!(
            frame_id = id,
            missing_packets = meta.common.missing_packets,
            "incomplete frame"
        );
    }
    stats.record_frame(meta.common.missing_packets);
}
