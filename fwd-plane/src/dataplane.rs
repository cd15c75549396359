//! # Dataplane Loop
//!
//! ## Purpose
//!
//! Owns every port, the readiness poller and one forwarder, and moves frames
//! between them until asked to stop. This is the whole per-application
//! context; nothing lives in globals.
//!
//! ## How it works
//!
//! 1. Wait on the poller for ready ports (bounded by the poll interval so a
//!    shutdown request is noticed).
//! 2. For each ready port, receive one burst into the preallocated frames.
//! 3. Hand every frame to the forwarder, which may rewrite it and returns an
//!    `Action`.
//! 4. Gather the frames per egress port and send each port's list in one
//!    `send_burst`. `Flood` adds the frame to every port except the ingress
//!    one. Frames a port does not accept are counted as tx drops.
//!
//! ## Main components
//!
//! - `Dataplane`: construction, `run_once()`, `run()`.
//! - `PortStats`: per-port counters.

use crate::forward::{Action, Forwarder};
use crate::poll::Poller;
use crate::transport::{Frame, Transport};
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Frames received per port per iteration.
pub const DEFAULT_BURST: usize = 32;

/// Longest time one wait blocks before the shutdown token is checked again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PortStats {
    pub rx: u64,
    pub tx: u64,
    pub tx_dropped: u64,
    pub errors: u64,
}

pub struct Dataplane<F: Forwarder> {
    ports: Vec<Box<dyn Transport>>,
    stats: Vec<PortStats>,
    poller: Poller,
    forwarder: F,
    burst: Vec<Frame>,
    /// Egress queue per port, as indices into `burst`.
    egress: Vec<Vec<usize>>,
    ready: Vec<usize>,
}

impl<F: Forwarder> Dataplane<F> {
    pub fn new(ports: Vec<Box<dyn Transport>>, forwarder: F) -> Self {
        Self::with_burst(ports, forwarder, DEFAULT_BURST)
    }

    pub fn with_burst(ports: Vec<Box<dyn Transport>>, forwarder: F, burst: usize) -> Self {
        let poller = Poller::new(ports.iter().map(|p| p.readiness_fd()));
        let n = ports.len();
        log::info!(
            "dataplane: {} with {} ports ({})",
            forwarder.name(),
            n,
            ports.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );
        Dataplane {
            ports,
            stats: vec![PortStats::default(); n],
            poller,
            forwarder,
            burst: vec![Frame::new(); burst.max(1)],
            egress: vec![Vec::new(); n],
            ready: Vec::with_capacity(n),
        }
    }

    pub fn forwarder(&self) -> &F {
        &self.forwarder
    }

    pub fn port_stats(&self) -> &[PortStats] {
        &self.stats
    }

    /// One wait plus one burst from every ready port. Returns the number of
    /// frames received.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut ready = std::mem::take(&mut self.ready);
        let waited = self.poller.wait(timeout, &mut ready);
        let mut received = 0;
        if waited.is_ok() {
            for &port in &ready {
                received += self.service(port);
            }
        }
        self.ready = ready;
        waited.map(|_| received)
    }

    /// Runs until `shutdown` is cancelled, then logs the counters.
    pub fn run(&mut self, shutdown: &CancellationToken) -> io::Result<()> {
        log::info!("dataplane: {} running", self.forwarder.name());
        let result = loop {
            if shutdown.is_cancelled() {
                break Ok(());
            }
            if let Err(e) = self.run_once(Some(POLL_INTERVAL)) {
                log::error!("dataplane: wait failed: {e}");
                break Err(e);
            }
        };
        self.log_stats();
        result
    }

    pub fn log_stats(&self) {
        for (port, s) in self.ports.iter().zip(&self.stats) {
            log::info!(
                "port {}: rx {}, tx {}, tx dropped {}, errors {}",
                port.name(),
                s.rx,
                s.tx,
                s.tx_dropped,
                s.errors
            );
        }
        self.forwarder.log_stats();
    }

    fn service(&mut self, ingress: usize) -> usize {
        let n = match self.ports[ingress].recv_burst(&mut self.burst) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                log::warn!("port {}: receive failed: {e}", self.ports[ingress].name());
                self.stats[ingress].errors += 1;
                0
            }
        };
        if n == 0 {
            return 0;
        }
        self.stats[ingress].rx += n as u64;

        for i in 0..n {
            match self.forwarder.forward(ingress, &mut self.burst[i]) {
                Action::Forward(port) if port < self.egress.len() => self.egress[port].push(i),
                Action::Forward(port) => {
                    log::debug!("dataplane: forwarder chose missing port {port}");
                }
                Action::Flood { except } => {
                    for (port, queue) in self.egress.iter_mut().enumerate() {
                        if port != except {
                            queue.push(i);
                        }
                    }
                }
                Action::Drop => {}
            }
        }
        self.flush();
        n
    }

    fn flush(&mut self) {
        let mut frames: Vec<&[u8]> = Vec::with_capacity(self.burst.len());
        for (port, queue) in self.egress.iter_mut().enumerate() {
            if queue.is_empty() {
                continue;
            }
            frames.clear();
            frames.extend(queue.iter().map(|&i| self.burst[i].data()));
            let stats = &mut self.stats[port];
            match self.ports[port].send_burst(&frames) {
                Ok(sent) => {
                    stats.tx += sent as u64;
                    stats.tx_dropped += (frames.len() - sent) as u64;
                }
                Err(e) => {
                    log::debug!("port {}: send failed: {e}", self.ports[port].name());
                    stats.errors += 1;
                    stats.tx_dropped += frames.len() as u64;
                }
            }
            queue.clear();
        }
    }
}

// ================================================================================================
//   UNITTESTS
// ================================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{Loopback, LoopbackHandle};
    use crate::patch::Patch;

    fn ports(n: usize) -> (Vec<Box<dyn Transport>>, Vec<LoopbackHandle>) {
        let mut ports: Vec<Box<dyn Transport>> = Vec::new();
        let mut handles = Vec::new();
        for i in 0..n {
            let (port, handle) = Loopback::new(&format!("lb{i}")).unwrap();
            ports.push(Box::new(port));
            handles.push(handle);
        }
        (ports, handles)
    }

    /// Floods everything, for exercising the fan-out path.
    struct Hub;

    impl Forwarder for Hub {
        fn name(&self) -> &'static str {
            "hub"
        }

        fn forward(&mut self, ingress: usize, _frame: &mut Frame) -> Action {
            Action::Flood { except: ingress }
        }
    }

    #[test]
    fn test_patch_moves_frames_in_order() {
        let (p, h) = ports(2);
        let mut dp = Dataplane::new(p, Patch::pair());
        for i in 0..5u8 {
            h[0].inject(&[i; 60]);
        }
        assert_eq!(dp.run_once(Some(Duration::from_millis(10))).unwrap(), 5);
        let sent = h[1].take_sent();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().enumerate().all(|(i, f)| f[0] == i as u8));
        assert!(h[0].take_sent().is_empty());
        assert_eq!(dp.port_stats()[0].rx, 5);
        assert_eq!(dp.port_stats()[1].tx, 5);
    }

    #[test]
    fn test_burst_limit() {
        let (p, h) = ports(2);
        let mut dp = Dataplane::with_burst(p, Patch::pair(), 4);
        for _ in 0..10 {
            h[1].inject(&[7; 60]);
        }
        assert_eq!(dp.run_once(None).unwrap(), 4);
        assert_eq!(h[1].pending(), 6);
        assert_eq!(dp.run_once(None).unwrap(), 4);
        assert_eq!(dp.run_once(None).unwrap(), 2);
        assert_eq!(h[0].take_sent().len(), 10);
    }

    #[test]
    fn test_flood_skips_ingress() {
        let (p, h) = ports(4);
        let mut dp = Dataplane::new(p, Hub);
        h[2].inject(&[1; 60]);
        dp.run_once(None).unwrap();
        let counts: Vec<usize> = h.iter().map(|h| h.take_sent().len()).collect();
        assert_eq!(counts, vec![1, 1, 0, 1]);
    }

    #[test]
    fn test_tx_backpressure_counted() {
        let (p, h) = ports(2);
        let mut dp = Dataplane::new(p, Patch::pair());
        h[1].set_tx_limit(Some(2));
        for _ in 0..3 {
            h[0].inject(&[3; 60]);
        }
        dp.run_once(None).unwrap();
        assert_eq!(h[1].take_sent().len(), 2);
        assert_eq!(dp.port_stats()[1].tx_dropped, 1);
    }

    #[test]
    fn test_run_stops_on_cancel() {
        let (p, _h) = ports(2);
        let mut dp = Dataplane::new(p, Patch::pair());
        let token = CancellationToken::new();
        token.cancel();
        dp.run(&token).unwrap();
    }
}
