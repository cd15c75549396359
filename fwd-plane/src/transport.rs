//! # Frame Transports
//!
//! ## Purpose
//!
//! A transport moves raw Ethernet frames between the dataplane and one port.
//! The forwarding logic only sees this trait, so backends can be swapped
//! without touching the forwarders or the tables.
//!
//! ## Main components
//!
//! - `Frame`: a reusable receive buffer with a fill length.
//! - `Transport`: burst receive, burst transmit and a readiness handle.

use std::io;
use std::os::fd::RawFd;

/// Size of a frame buffer, large enough for a 1500 byte MTU frame with an
/// 802.1Q tag.
pub const FRAME_SIZE: usize = 2048;

/// Smallest frame worth looking at: a bare Ethernet II header.
pub const MIN_FRAME: usize = 14;

/// A fixed-capacity frame buffer. Allocated once and reused for every burst.
#[derive(Clone)]
pub struct Frame {
    buf: Box<[u8]>,
    len: usize,
}

impl Frame {
    pub fn new() -> Self {
        Frame {
            buf: vec![0u8; FRAME_SIZE].into_boxed_slice(),
            len: 0,
        }
    }

    /// A frame holding a copy of `data`, truncated to `FRAME_SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut frame = Frame::new();
        let len = data.len().min(FRAME_SIZE);
        frame.buf[..len].copy_from_slice(&data[..len]);
        frame.len = len;
        frame
    }

    /// The received bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    /// The whole buffer, for a backend to receive into.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    #[inline]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buf.len());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({} bytes)", self.len)
    }
}

/// One port of the dataplane.
///
/// Both burst calls are non-blocking: they move as many frames as are
/// available (or as fit) and return the count, `Ok(0)` meaning "nothing right
/// now". Blocking is the job of the readiness layer.
pub trait Transport: Send {
    /// Port name for logs.
    fn name(&self) -> &str;

    /// Receives up to `frames.len()` frames, filling them from the front.
    fn recv_burst(&mut self, frames: &mut [Frame]) -> io::Result<usize>;

    /// Transmits frames in order, returning how many were accepted.
    fn send_burst(&mut self, frames: &[&[u8]]) -> io::Result<usize>;

    /// Descriptor that polls readable when frames are pending. `None` means
    /// the transport must be polled on every iteration.
    fn readiness_fd(&self) -> Option<RawFd>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn recv_burst(&mut self, frames: &mut [Frame]) -> io::Result<usize> {
        (**self).recv_burst(frames)
    }

    fn send_burst(&mut self, frames: &[&[u8]]) -> io::Result<usize> {
        (**self).send_burst(frames)
    }

    fn readiness_fd(&self) -> Option<RawFd> {
        (**self).readiness_fd()
    }
}
