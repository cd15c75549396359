//! # fwd-table
//!
//! Forwarding decision tables for a software dataplane:
//!
//! - [`MacTable`]: exact match on (MAC, VLAN), answers "which port".
//! - [`Ipv4Lpm`] / [`Ipv6Lpm`]: longest-prefix-match tries, answer "which next
//!   hop".
//! - [`addr`]: text codecs for MAC addresses and CIDR prefixes.
//!
//! Lookups take `&self`, never block and never fail; misses are reported as
//! [`INVALID_PORT`] / [`NO_ROUTE`]. Mutations also take `&self` and are
//! serialised internally, so a table can sit in an `Arc` shared by a control
//! thread and any number of forwarding threads.

pub mod addr;
pub mod cam;
pub mod error;
pub mod lpm;
pub mod mmap;

pub use addr::{
    Cidr, MacAddr, mac_from_bytes, mac_to_str, mac_to_u64, parse_cidr, parse_ipv4,
    parse_ipv4_cidr, parse_ipv6, parse_ipv6_cidr, parse_mac_cidr, str_to_mac, u64_to_mac,
};
pub use cam::{CamConfig, CamStats, INVALID_PORT, MacTable};
pub use error::{ParseError, TableError};
pub use lpm::{Ipv4Lpm, Ipv6Lpm, Lpm, LpmAddr, LpmConfig, LpmStats, NO_ROUTE};
