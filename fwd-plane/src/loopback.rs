//! In-memory transport.
//!
//! A `Loopback` port is fed and drained through its `LoopbackHandle` instead of
//! a NIC, which lets the forwarders and the dataplane loop run in tests and
//! dry runs. Readiness is real: an `eventfd` is signalled while frames are
//! queued, so the port can sit in the same `poll(2)` set as raw sockets.

use crate::transport::{Frame, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd, RawFd};
use std::sync::Arc;

struct Queues {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
    /// Frames accepted by `send_burst` before it reports back-pressure.
    tx_limit: Option<usize>,
}

struct Shared {
    queues: Mutex<Queues>,
    event: OwnedFd,
}

impl Shared {
    /// Adds one to the eventfd counter, making the port readable.
    fn signal(&self) -> io::Result<()> {
        let one: u64 = 1;
        let n = unsafe {
            libc::write(
                self.event.as_raw_fd(),
                &one as *const u64 as *const libc::c_void,
                8,
            )
        };
        if n != 8 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Drains the eventfd counter. An already drained counter is not an error.
    fn reset(&self) -> io::Result<()> {
        let mut value: u64 = 0;
        let n = unsafe {
            libc::read(
                self.event.as_raw_fd(),
                &mut value as *mut u64 as *mut libc::c_void,
                8,
            )
        };
        if n != 8 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
        }
        Ok(())
    }
}

pub struct Loopback {
    name: String,
    shared: Arc<Shared>,
}

/// The far end of a `Loopback` port.
#[derive(Clone)]
pub struct LoopbackHandle {
    shared: Arc<Shared>,
}

impl Loopback {
    pub fn new(name: &str) -> io::Result<(Loopback, LoopbackHandle)> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                rx: VecDeque::new(),
                tx: Vec::new(),
                tx_limit: None,
            }),
            event: unsafe { OwnedFd::from_raw_fd(fd) },
        });
        let port = Loopback {
            name: name.to_owned(),
            shared: shared.clone(),
        };
        Ok((port, LoopbackHandle { shared }))
    }
}

impl LoopbackHandle {
    /// Queues a frame for the port to receive.
    pub fn inject(&self, frame: &[u8]) {
        let mut q = self.shared.queues.lock();
        q.rx.push_back(frame.to_vec());
        if let Err(e) = self.shared.signal() {
            log::error!("loopback: cannot signal readiness: {e}");
        }
    }

    /// Takes every frame the port transmitted so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.shared.queues.lock().tx)
    }

    /// Frames still waiting to be received.
    pub fn pending(&self) -> usize {
        self.shared.queues.lock().rx.len()
    }

    /// Makes `send_burst` accept at most `limit` more frames.
    pub fn set_tx_limit(&self, limit: Option<usize>) {
        self.shared.queues.lock().tx_limit = limit;
    }
}

impl Transport for Loopback {
    fn name(&self) -> &str {
        &self.name
    }

    fn recv_burst(&mut self, frames: &mut [Frame]) -> io::Result<usize> {
        let mut q = self.shared.queues.lock();
        let mut count = 0;
        for frame in frames.iter_mut() {
            let Some(data) = q.rx.pop_front() else {
                break;
            };
            let buf = frame.buffer_mut();
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            frame.set_len(n);
            count += 1;
        }
        if q.rx.is_empty() {
            self.shared.reset()?;
        }
        Ok(count)
    }

    fn send_burst(&mut self, frames: &[&[u8]]) -> io::Result<usize> {
        let mut q = self.shared.queues.lock();
        let accepted = q.tx_limit.map_or(frames.len(), |l| l.min(frames.len()));
        if let Some(limit) = q.tx_limit.as_mut() {
            *limit -= accepted;
        }
        q.tx.extend(frames[..accepted].iter().map(|f| f.to_vec()));
        Ok(accepted)
    }

    fn readiness_fd(&self) -> Option<RawFd> {
        Some(self.shared.event.as_raw_fd())
    }
}
