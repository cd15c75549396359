//!
//! # Port Readiness
//!
//! Waits until at least one port of the dataplane has frames to read. The
//! readiness handles of all ports go into one `poll(2)` set; ports without a
//! handle are reported ready on every wait and force a zero timeout.
//!
//! A wait interrupted by a signal returns no ready ports instead of an error,
//! so the caller gets a chance to look at its shutdown flag and then simply
//! waits again.
//!

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

pub struct Poller {
    fds: Vec<libc::pollfd>,
    /// Port index of each entry in `fds`.
    ports: Vec<usize>,
    always_ready: Vec<usize>,
}

impl Poller {
    /// Builds the poll set from the readiness handles of ports `0..n`.
    pub fn new<I>(handles: I) -> Self
    where
        I: IntoIterator<Item = Option<RawFd>>,
    {
        let mut poller = Poller {
            fds: Vec::new(),
            ports: Vec::new(),
            always_ready: Vec::new(),
        };
        for (port, handle) in handles.into_iter().enumerate() {
            match handle {
                Some(fd) => {
                    poller.fds.push(libc::pollfd {
                        fd,
                        events: libc::POLLIN,
                        revents: 0,
                    });
                    poller.ports.push(port);
                }
                None => poller.always_ready.push(port),
            }
        }
        poller
    }

    /// Blocks up to `timeout` (forever if `None`) and fills `ready` with the
    /// indices of the readable ports, in port order.
    pub fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<usize>) -> io::Result<()> {
        ready.clear();
        let timeout_ms = if !self.always_ready.is_empty() {
            0
        } else {
            timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as libc::c_int)
        };
        for pfd in self.fds.iter_mut() {
            pfd.revents = 0;
        }
        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }
        for (pfd, &port) in self.fds.iter().zip(&self.ports) {
            if pfd.revents & libc::POLLNVAL != 0 {
                return Err(io::Error::other(format!("port {port}: invalid readiness handle")));
            }
            if pfd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0 {
                ready.push(port);
            }
        }
        ready.extend_from_slice(&self.always_ready);
        ready.sort_unstable();
        Ok(())
    }
}
