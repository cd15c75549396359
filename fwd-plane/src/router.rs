//! # Static IPv4/IPv6 Router
//!
//! ## Purpose
//!
//! Routes IP packets between dataplane ports using the LPM tables for the
//! route lookup and a static neighbour table for next-hop resolution.
//!
//! ## How it works
//!
//! Routes map a destination prefix to a next-hop id. A next-hop id resolves
//! through the neighbour table to the neighbour's IP address, its MAC address
//! and the egress port. For each frame:
//!
//! 1. Non-IP frames are dropped.
//! 2. The destination is looked up in the IPv4 or IPv6 table; no route drops.
//! 3. The next-hop id must name a known neighbour whose port is not the
//!    ingress port.
//! 4. A TTL / hop limit of 1 or less drops; otherwise it is decremented and,
//!    for IPv4, the header checksum is recomputed.
//! 5. The Ethernet header is rewritten: destination = neighbour MAC, source =
//!    MAC of the egress interface.
//!
//! ## Main components
//!
//! - `Router`: the tables plus per-port interface MACs.
//! - `route()`: next-hop resolution for a destination address.
//! - `NextHop`, `Neighbor`: resolution results and table entries.

use crate::forward::{Action, Forwarder};
use crate::transport::Frame;
use etherparse::{EtherType, Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice};
use fwd_table::{Ipv4Lpm, Ipv6Lpm, MacAddr};
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

const ETH_HEADER_LEN: usize = 14;
const IPV4_TTL: usize = 8;
const IPV4_CHECKSUM: usize = 10;
const IPV6_HOP_LIMIT: usize = 7;

/// A statically configured neighbour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub ip: IpAddr,
    pub mac: MacAddr,
    /// Dataplane port the neighbour is reached through.
    pub port: usize,
}

/// Resolution of a destination address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NextHop {
    /// The next-hop id the route pointed at.
    pub id: u32,
    /// The IP address of the neighbour.
    pub ip_addr: IpAddr,
    /// The MAC address to put in the Ethernet destination.
    pub mac_addr: MacAddr,
    pub port: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub forwarded: u64,
    pub not_ip: u64,
    pub no_route: u64,
    pub unknown_next_hop: u64,
    pub ttl_expired: u64,
    pub hairpin: u64,
    pub malformed: u64,
}

pub struct Router {
    v4: Arc<Ipv4Lpm>,
    v6: Arc<Ipv6Lpm>,
    /// Next-hop id to neighbour.
    neighbors: HashMap<u32, Neighbor>,
    /// Router MAC of each port, indexed by port.
    port_macs: Vec<MacAddr>,
    stats: RouterStats,
}

impl Router {
    pub fn new(v4: Arc<Ipv4Lpm>, v6: Arc<Ipv6Lpm>, port_macs: Vec<MacAddr>) -> Self {
        Router {
            v4,
            v6,
            neighbors: HashMap::new(),
            port_macs,
            stats: RouterStats::default(),
        }
    }

    /// Registers neighbour `id`, replacing an earlier one with the same id.
    pub fn add_neighbor(&mut self, id: u32, neighbor: Neighbor) -> io::Result<()> {
        if neighbor.port >= self.port_macs.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "next hop {id}: port {} out of range, router has {} ports",
                    neighbor.port,
                    self.port_macs.len()
                ),
            ));
        }
        log::info!(
            "next hop {id}: {} {} via port {}",
            neighbor.ip,
            neighbor.mac,
            neighbor.port
        );
        self.neighbors.insert(id, neighbor);
        Ok(())
    }

    pub fn neighbors(&self) -> &HashMap<u32, Neighbor> {
        &self.neighbors
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Finds the next hop for `dest`.
    ///
    /// The longest matching route of the destination family gives a next-hop
    /// id, which must be a registered neighbour.
    pub fn route(&self, dest: IpAddr) -> Option<NextHop> {
        let id = match dest {
            IpAddr::V4(addr) => self.v4.route(addr)?,
            IpAddr::V6(addr) => self.v6.route(addr)?,
        };
        let neighbor = self.neighbors.get(&id)?;
        Some(NextHop {
            id,
            ip_addr: neighbor.ip,
            mac_addr: neighbor.mac,
            port: neighbor.port,
        })
    }

    /// Resolves `dest` and counts why it failed, if it did.
    fn resolve(&mut self, dest: IpAddr, ingress: usize) -> Option<NextHop> {
        let found = match dest {
            IpAddr::V4(addr) => self.v4.route(addr),
            IpAddr::V6(addr) => self.v6.route(addr),
        };
        let Some(id) = found else {
            self.stats.no_route += 1;
            return None;
        };
        let Some(neighbor) = self.neighbors.get(&id) else {
            self.stats.unknown_next_hop += 1;
            return None;
        };
        if neighbor.port == ingress {
            self.stats.hairpin += 1;
            return None;
        }
        Some(NextHop {
            id,
            ip_addr: neighbor.ip,
            mac_addr: neighbor.mac,
            port: neighbor.port,
        })
    }
}

impl Forwarder for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn forward(&mut self, ingress: usize, frame: &mut Frame) -> Action {
        let Ok(eth) = Ethernet2HeaderSlice::from_slice(frame.data()) else {
            self.stats.malformed += 1;
            return Action::Drop;
        };
        let ether_type = eth.ether_type();
        let l3 = ETH_HEADER_LEN;

        let hop = match ether_type {
            EtherType::IPV4 => {
                let Ok(ip) = Ipv4HeaderSlice::from_slice(&frame.data()[l3..]) else {
                    self.stats.malformed += 1;
                    return Action::Drop;
                };
                let dest = IpAddr::V4(ip.destination_addr());
                let ttl = ip.ttl();
                let Some(hop) = self.resolve(dest, ingress) else {
                    return Action::Drop;
                };
                if ttl <= 1 {
                    self.stats.ttl_expired += 1;
                    return Action::Drop;
                }
                let mut header = ip.to_header();
                header.time_to_live = ttl - 1;
                let checksum = header.calc_header_checksum();
                let data = frame.data_mut();
                data[l3 + IPV4_TTL] = ttl - 1;
                data[l3 + IPV4_CHECKSUM..l3 + IPV4_CHECKSUM + 2]
                    .copy_from_slice(&checksum.to_be_bytes());
                hop
            }
            EtherType::IPV6 => {
                let Ok(ip) = Ipv6HeaderSlice::from_slice(&frame.data()[l3..]) else {
                    self.stats.malformed += 1;
                    return Action::Drop;
                };
                let dest = IpAddr::V6(ip.destination_addr());
                let hop_limit = ip.hop_limit();
                let Some(hop) = self.resolve(dest, ingress) else {
                    return Action::Drop;
                };
                if hop_limit <= 1 {
                    self.stats.ttl_expired += 1;
                    return Action::Drop;
                }
                frame.data_mut()[l3 + IPV6_HOP_LIMIT] = hop_limit - 1;
                hop
            }
            _ => {
                self.stats.not_ip += 1;
                return Action::Drop;
            }
        };

        let data = frame.data_mut();
        data[0..6].copy_from_slice(&hop.mac_addr.octets());
        data[6..12].copy_from_slice(&self.port_macs[hop.port].octets());
        self.stats.forwarded += 1;
        Action::Forward(hop.port)
    }

    fn log_stats(&self) {
        let s = &self.stats;
        log::info!(
            "router: forwarded {}, no route {}, unknown next hop {}, ttl expired {}, hairpin {}, not ip {}, malformed {}",
            s.forwarded,
            s.no_route,
            s.unknown_next_hop,
            s.ttl_expired,
            s.hairpin,
            s.not_ip,
            s.malformed
        );
        log::info!("router: IPv4 routes {}", self.v4.stats());
        log::info!("router: IPv6 routes {}", self.v6.stats());
    }
}

// ================================================================================================
//   UNITTESTS
// ================================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;
    use fwd_table::LpmConfig;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn port_mac(i: u8) -> MacAddr {
        MacAddr::new([0x4e, 0x12, 0xe7, 0x42, 0x83, 0x05 + i])
    }

    fn router() -> Router {
        let cfg = LpmConfig {
            max_rules: 16,
            max_blocks: None,
            huge_page: Some(false),
        };
        let v4 = Arc::new(Ipv4Lpm::with_config(&cfg).unwrap());
        let v6 = Arc::new(Ipv6Lpm::with_config(&cfg).unwrap());
        v4.add(Ipv4Addr::new(192, 168, 5, 0), 24, 1).unwrap();
        v4.add(Ipv4Addr::new(192, 168, 6, 0), 24, 2).unwrap();
        v4.add(Ipv4Addr::new(10, 0, 0, 0), 8, 9).unwrap();
        v6.add("2001:db8:5::".parse().unwrap(), 48, 1).unwrap();
        let mut r = Router::new(v4, v6, (0..4).map(port_mac).collect());
        r.add_neighbor(
            1,
            Neighbor {
                ip: "192.168.5.100".parse().unwrap(),
                mac: "4e:12:e7:42:83:01".parse().unwrap(),
                port: 0,
            },
        )
        .unwrap();
        r.add_neighbor(
            2,
            Neighbor {
                ip: "192.168.6.100".parse().unwrap(),
                mac: "4e:12:e7:42:83:03".parse().unwrap(),
                port: 1,
            },
        )
        .unwrap();
        r
    }

    fn ipv4_frame(dst: Ipv4Addr, ttl: u8) -> Frame {
        let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], port_mac(2).octets())
            .ipv4([192, 168, 7, 10], dst.octets(), ttl)
            .udp(1000, 2000);
        let payload = b"ping";
        let mut buf = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut buf, payload).unwrap();
        Frame::from_bytes(&buf)
    }

    fn ipv6_frame(dst: Ipv6Addr, hop_limit: u8) -> Frame {
        let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], port_mac(2).octets())
            .ipv6(
                "2001:db8:7::10".parse::<Ipv6Addr>().unwrap().octets(),
                dst.octets(),
                hop_limit,
            )
            .udp(1000, 2000);
        let payload = b"ping";
        let mut buf = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut buf, payload).unwrap();
        Frame::from_bytes(&buf)
    }

    #[test]
    fn test_route_lookup() {
        let r = router();
        let hop = r.route("192.168.6.7".parse().unwrap()).unwrap();
        assert_eq!(hop.id, 2);
        assert_eq!(hop.port, 1);
        assert_eq!(hop.mac_addr.to_string(), "4e:12:e7:42:83:03");
        assert!(r.route("172.16.0.1".parse().unwrap()).is_none());
        // route exists but next hop 9 is not a neighbour
        assert!(r.route("10.1.1.1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_forward_ipv4_rewrites_frame() {
        let mut r = router();
        let mut frame = ipv4_frame(Ipv4Addr::new(192, 168, 5, 20), 64);
        assert_eq!(r.forward(2, &mut frame), Action::Forward(0));

        let data = frame.data();
        assert_eq!(&data[0..6], &[0x4e, 0x12, 0xe7, 0x42, 0x83, 0x01]);
        assert_eq!(&data[6..12], &port_mac(0).octets());
        let ip = Ipv4HeaderSlice::from_slice(&data[14..]).unwrap();
        assert_eq!(ip.ttl(), 63);
        assert_eq!(ip.header_checksum(), ip.to_header().calc_header_checksum());
        assert_eq!(r.stats().forwarded, 1);
    }

    #[test]
    fn test_forward_ipv6_decrements_hop_limit() {
        let mut r = router();
        let mut frame = ipv6_frame("2001:db8:5::1".parse().unwrap(), 2);
        assert_eq!(r.forward(3, &mut frame), Action::Forward(0));
        let ip = Ipv6HeaderSlice::from_slice(&frame.data()[14..]).unwrap();
        assert_eq!(ip.hop_limit(), 1);
    }

    #[test]
    fn test_drops() {
        let mut r = router();
        // ttl expired
        let mut frame = ipv4_frame(Ipv4Addr::new(192, 168, 5, 20), 1);
        let before = frame.data().to_vec();
        assert_eq!(r.forward(2, &mut frame), Action::Drop);
        assert_eq!(frame.data(), &before[..]);
        // no route
        assert_eq!(r.forward(2, &mut ipv4_frame(Ipv4Addr::new(8, 8, 8, 8), 64)), Action::Drop);
        // unknown next hop id
        assert_eq!(r.forward(2, &mut ipv4_frame(Ipv4Addr::new(10, 0, 0, 1), 64)), Action::Drop);
        // egress == ingress
        assert_eq!(r.forward(0, &mut ipv4_frame(Ipv4Addr::new(192, 168, 5, 20), 64)), Action::Drop);
        // ARP
        let mut arp = before.clone();
        arp[12..14].copy_from_slice(&0x0806u16.to_be_bytes());
        assert_eq!(r.forward(2, &mut Frame::from_bytes(&arp)), Action::Drop);
        // truncated
        assert_eq!(r.forward(2, &mut Frame::from_bytes(&before[..20])), Action::Drop);

        let s = r.stats();
        assert_eq!(
            (s.ttl_expired, s.no_route, s.unknown_next_hop, s.hairpin, s.not_ip, s.malformed),
            (1, 1, 1, 1, 1, 1)
        );
        assert_eq!(s.forwarded, 0);
    }

    #[test]
    fn test_neighbor_port_checked() {
        let mut r = router();
        let err = r
            .add_neighbor(
                7,
                Neighbor {
                    ip: "192.168.9.1".parse().unwrap(),
                    mac: MacAddr::ZERO,
                    port: 4,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
