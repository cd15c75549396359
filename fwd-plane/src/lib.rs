//! # fwd-plane
//!
//! Forwarding applications on top of `fwd_table`: a port patch, a learning
//! switch and a static router. Each is a [`Forwarder`] driven by a
//! [`Dataplane`] over a set of [`Transport`] ports.

pub mod app;
pub mod config;
pub mod dataplane;
pub mod forward;
pub mod loopback;
pub mod patch;
pub mod poll;
pub mod raw_socket;
pub mod router;
pub mod switch;
pub mod transport;

pub use dataplane::{Dataplane, PortStats};
pub use forward::{Action, Forwarder};
pub use loopback::{Loopback, LoopbackHandle};
pub use patch::Patch;
pub use poll::Poller;
pub use raw_socket::{RawSocket, mac_by_name};
pub use router::{Neighbor, NextHop, Router, RouterStats};
pub use switch::{Switch, SwitchStats, parse_l2};
pub use transport::{FRAME_SIZE, Frame, MIN_FRAME, Transport};
