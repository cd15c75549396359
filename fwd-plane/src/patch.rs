//! L2 patch: every frame received on a port leaves on its fixed peer port,
//! untouched.

use crate::forward::{Action, Forwarder};
use crate::transport::Frame;

pub struct Patch {
    peers: Vec<Option<usize>>,
    forwarded: u64,
    dropped: u64,
}

impl Patch {
    /// `peers[i]` is the egress port for frames arriving on port `i`.
    pub fn new(peers: Vec<Option<usize>>) -> Self {
        Patch {
            peers,
            forwarded: 0,
            dropped: 0,
        }
    }

    /// Ports 0 and 1 patched to each other.
    pub fn pair() -> Self {
        Patch::new(vec![Some(1), Some(0)])
    }
}

impl Forwarder for Patch {
    fn name(&self) -> &'static str {
        "patch"
    }

    fn forward(&mut self, ingress: usize, _frame: &mut Frame) -> Action {
        match self.peers.get(ingress).copied().flatten() {
            Some(peer) if peer != ingress => {
                self.forwarded += 1;
                Action::Forward(peer)
            }
            _ => {
                self.dropped += 1;
                Action::Drop
            }
        }
    }

    fn log_stats(&self) {
        log::info!("patch: forwarded {}, dropped {}", self.forwarded, self.dropped);
    }
}
