mod assembler;
mod receiver;
mod stats;

pub use assembler::{AssemblerCounters, Disposition, FrameAssembler, Rejection};
pub use receiver::{MemorySource, PacketSource, UdpPacketReceiver, UdpReceiverConfig};
pub use stats::{FrameReport, FrameStats};
