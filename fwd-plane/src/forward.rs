//! Forwarding decisions.
//!
//! A `Forwarder` looks at one received frame, may rewrite it in place, and
//! says where it goes. Ports are dataplane indices.

use crate::transport::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send to exactly this port.
    Forward(usize),
    /// Send to every port except `except` (the ingress port).
    Flood { except: usize },
    Drop,
}

pub trait Forwarder: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn forward(&mut self, ingress: usize, frame: &mut Frame) -> Action;

    /// Logs cumulative counters, called once when the dataplane stops.
    fn log_stats(&self) {}
}

impl<F: Forwarder + ?Sized> Forwarder for Box<F> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn forward(&mut self, ingress: usize, frame: &mut Frame) -> Action {
        (**self).forward(ingress, frame)
    }

    fn log_stats(&self) {
        (**self).log_stats()
    }
}
