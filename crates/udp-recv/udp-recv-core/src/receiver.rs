//! Batched datagram intake.
//!
//! On Linux a single `recvmmsg(2)` call fills up to `batch_packets` slots of a
//! preallocated buffer: it blocks (bounded by the socket read timeout) until
//! the first datagram arrives, then drains whatever else is queued without
//! waiting.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Where the receive loop gets its datagrams from.
pub trait PacketSource {
    /// Receives the next batch. `Ok(0)` when nothing arrived within the
    /// source's timeout.
    fn receive_many(&mut self) -> io::Result<usize>;

    /// Datagram `index` of the last batch.
    fn packet(&self, index: usize) -> &[u8];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpReceiverConfig {
    /// 0 binds an ephemeral port.
    pub port: u16,
    /// Largest datagram accepted; longer ones are truncated.
    pub packet_bytes: usize,
    pub batch_packets: usize,
    pub timeout: Duration,
    pub rcvbuf_bytes: usize,
}

pub struct UdpPacketReceiver {
    socket: UdpSocket,
    packet_bytes: usize,
    buffer: Vec<u8>,
    lens: Vec<usize>,
    #[cfg(target_os = "linux")]
    iovecs: Vec<libc::iovec>,
    #[cfg(target_os = "linux")]
    msgs: Vec<libc::mmsghdr>,
}

// The raw pointers in `iovecs`/`msgs` only point into `buffer` and `iovecs`,
// both owned and never reallocated after construction.
unsafe impl Send for UdpPacketReceiver {}

impl UdpPacketReceiver {
    pub fn bind(cfg: &UdpReceiverConfig) -> io::Result<Self> {
        let batch = cfg.batch_packets.max(1);
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cfg.port))?;
        // A zero timeout would mean "block forever".
        socket.set_read_timeout(Some(cfg.timeout.max(Duration::from_micros(1))))?;
        let rcvbuf = set_recv_buffer(&socket, cfg.rcvbuf_bytes)?;
        if rcvbuf < cfg.rcvbuf_bytes {
            tracing::warn!(
                requested = cfg.rcvbuf_bytes,
                effective = rcvbuf,
                "kernel capped the socket receive buffer (see net.core.rmem_max)"
            );
        }

        let mut buffer = vec![0u8; batch * cfg.packet_bytes];

        #[cfg(target_os = "linux")]
        let (iovecs, msgs) = {
            let mut iovecs: Vec<libc::iovec> = buffer
                .chunks_exact_mut(cfg.packet_bytes)
                .map(|slot| libc::iovec {
                    iov_base: slot.as_mut_ptr().cast(),
                    iov_len: slot.len(),
                })
                .collect();
            let msgs = iovecs
                .iter_mut()
                .map(|iov| {
                    // SAFETY: mmsghdr is plain C data; all-zero is a valid value.
                    let mut msg: libc::mmsghdr = unsafe { std::mem::zeroed() };
                    msg.msg_hdr.msg_iov = iov;
                    msg.msg_hdr.msg_iovlen = 1;
                    msg
                })
                .collect();
            (iovecs, msgs)
        };

        tracing::debug!(
            addr = ?socket.local_addr()?,
            batch,
            packet_bytes = cfg.packet_bytes,
            rcvbuf,
            "udp receiver bound"
        );

        Ok(Self {
            socket,
            packet_bytes: cfg.packet_bytes,
            buffer,
            lens: vec![0; batch],
            #[cfg(target_os = "linux")]
            iovecs,
            #[cfg(target_os = "linux")]
            msgs,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl PacketSource for UdpPacketReceiver {
    #[cfg(target_os = "linux")]
    fn receive_many(&mut self) -> io::Result<usize> {
        debug_assert_eq!(self.iovecs.len(), self.msgs.len());
        // SAFETY: every mmsghdr points at its own iovec, which points at a
        // distinct `packet_bytes` slot of `buffer`; all three outlive the call.
        let n = unsafe {
            libc::recvmmsg(
                self.socket.as_raw_fd(),
                self.msgs.as_mut_ptr(),
                self.msgs.len() as libc::c_uint,
                libc::MSG_WAITFORONE as _,
                std::ptr::null_mut(),
            )
        };
        if n < 0 {
            return timed_out(io::Error::last_os_error());
        }
        let n = n as usize;
        for (len, msg) in self.lens.iter_mut().zip(&self.msgs).take(n) {
            *len = msg.msg_len as usize;
        }
        Ok(n)
    }

    #[cfg(not(target_os = "linux"))]
    fn receive_many(&mut self) -> io::Result<usize> {
        match self.socket.recv(&mut self.buffer[..self.packet_bytes]) {
            Ok(len) => {
                self.lens[0] = len;
                Ok(1)
            }
            Err(e) => timed_out(e),
        }
    }

    #[inline]
    fn packet(&self, index: usize) -> &[u8] {
        let start = index * self.packet_bytes;
        &self.buffer[start..start + self.lens[index]]
    }
}

fn timed_out(err: io::Error) -> io::Result<usize> {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => Ok(0),
        _ => Err(err),
    }
}

/// Sets `SO_RCVBUF` and returns the size the kernel actually granted.
fn set_recv_buffer(socket: &UdpSocket, bytes: usize) -> io::Result<usize> {
    let fd = socket.as_raw_fd();
    let requested = libc::c_int::try_from(bytes).unwrap_or(libc::c_int::MAX);
    let opt_len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

    // SAFETY: `requested` outlives the call and `opt_len` is its size.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&requested as *const libc::c_int).cast(),
            opt_len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut granted: libc::c_int = 0;
    let mut len = opt_len;
    // SAFETY: `granted` and `len` are valid for writes of their sizes.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&mut granted as *mut libc::c_int).cast(),
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // Linux reports twice the usable size.
    let granted = usize::try_from(granted).unwrap_or(0);
    Ok(if cfg!(target_os = "linux") { granted / 2 } else { granted })
}

/// Replays queued batches; for tests and benchmarks.
#[derive(Debug, Default)]
pub struct MemorySource {
    batches: VecDeque<Vec<Vec<u8>>>,
    current: Vec<Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&mut self, batch: Vec<Vec<u8>>) {
        self.batches.push_back(batch);
    }

    pub fn is_drained(&self) -> bool {
        self.batches.is_empty()
    }
}

impl PacketSource for MemorySource {
    fn receive_many(&mut self) -> io::Result<usize> {
        self.current = self.batches.pop_front().unwrap_or_default();
        Ok(self.current.len())
    }

    fn packet(&self, index: usize) -> &[u8] {
        &self.current[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn receiver(batch_packets: usize) -> UdpPacketReceiver {
        UdpPacketReceiver::bind(&UdpReceiverConfig {
            port: 0,
            packet_bytes: 64,
            batch_packets,
            timeout: Duration::from_millis(20),
            rcvbuf_bytes: 1 << 16,
        })
        .unwrap()
    }

    #[test]
    fn times_out_without_traffic() {
        let mut rx = receiver(4);
        assert_eq!(rx.receive_many().unwrap(), 0);
    }

    #[test]
    fn receives_datagrams_in_order() {
        let mut rx = receiver(8);
        let port = rx.local_addr().unwrap().port();
        let tx = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        for i in 0..3u8 {
            tx.send_to(&[i; 10], (Ipv4Addr::LOCALHOST, port)).unwrap();
        }

        let mut got = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while got.len() < 3 && Instant::now() < deadline {
            let n = rx.receive_many().unwrap();
            got.extend((0..n).map(|i| rx.packet(i).to_vec()));
        }
        assert_eq!(got, vec![vec![0; 10], vec![1; 10], vec![2; 10]]);
    }

    #[test]
    fn memory_source_replays_batches() {
        let mut src = MemorySource::new();
        src.push_batch(vec![vec![1], vec![2, 2]]);
        assert_eq!(src.receive_many().unwrap(), 2);
        assert_eq!(src.packet(1), &[2, 2]);
        assert!(src.is_drained());
        assert_eq!(src.receive_many().unwrap(), 0);
    }
}
