//! # Learning Switch
//!
//! ## Purpose
//!
//! A transparent L2 bridge over the MAC table: learns where source addresses
//! live and forwards by destination, flooding what it does not know.
//!
//! ## How it works
//!
//! The Ethernet header (and an 802.1Q tag, if present) is parsed with
//! `etherparse`. Untagged frames belong to the configured native VLAN. The
//! source (MAC, VLAN) is learned against the ingress port unless it is a group
//! address. Then:
//!
//! - broadcast, multicast and unknown unicast destinations flood to every port
//!   but the ingress one;
//! - a destination learned on the ingress port is filtered (dropped);
//! - anything else goes to the learned port.

use crate::forward::{Action, Forwarder};
use crate::transport::Frame;
use etherparse::{EtherType, Ethernet2HeaderSlice, SingleVlanHeaderSlice};
use fwd_table::{INVALID_PORT, MacAddr, MacTable, TableError};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwitchStats {
    pub forwarded: u64,
    pub flooded: u64,
    pub filtered: u64,
    pub learned: u64,
    pub learn_failures: u64,
    pub malformed: u64,
}

pub struct Switch {
    table: Arc<MacTable>,
    native_vlan: u16,
    stats: SwitchStats,
}

/// (destination, source, VLAN) of an Ethernet II frame.
pub fn parse_l2(data: &[u8], native_vlan: u16) -> Option<(MacAddr, MacAddr, u16)> {
    let eth = Ethernet2HeaderSlice::from_slice(data).ok()?;
    let dst = MacAddr::new(eth.destination());
    let src = MacAddr::new(eth.source());
    let vlan = match eth.ether_type() {
        EtherType::VLAN_TAGGED_FRAME => {
            let tag = SingleVlanHeaderSlice::from_slice(&data[eth.slice().len()..]).ok()?;
            tag.vlan_identifier().value()
        }
        _ => native_vlan,
    };
    Some((dst, src, vlan))
}

impl Switch {
    pub fn new(table: Arc<MacTable>, native_vlan: u16) -> Self {
        Switch {
            table,
            native_vlan,
            stats: SwitchStats::default(),
        }
    }

    pub fn table(&self) -> &Arc<MacTable> {
        &self.table
    }

    pub fn stats(&self) -> SwitchStats {
        self.stats
    }

    fn learn(&mut self, src: MacAddr, vlan: u16, ingress: usize) {
        if src.is_multicast() || self.table.lookup(src, vlan) == ingress as u32 {
            return;
        }
        match self.table.add(src, vlan, ingress as u32) {
            Ok(()) => self.stats.learned += 1,
            Err(TableError::TableFull) => {
                if self.stats.learn_failures == 0 {
                    log::warn!("switch: MAC table full, no longer learning new stations");
                }
                self.stats.learn_failures += 1;
            }
            Err(e) => {
                log::debug!("switch: cannot learn {src}@{vlan}: {e}");
                self.stats.learn_failures += 1;
            }
        }
    }
}

impl Forwarder for Switch {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn forward(&mut self, ingress: usize, frame: &mut Frame) -> Action {
        let Some((dst, src, vlan)) = parse_l2(frame.data(), self.native_vlan) else {
            self.stats.malformed += 1;
            return Action::Drop;
        };
        self.learn(src, vlan, ingress);

        if dst.is_multicast() {
            self.stats.flooded += 1;
            return Action::Flood { except: ingress };
        }
        match self.table.lookup(dst, vlan) {
            INVALID_PORT => {
                self.stats.flooded += 1;
                Action::Flood { except: ingress }
            }
            port if port as usize == ingress => {
                self.stats.filtered += 1;
                Action::Drop
            }
            port => {
                self.stats.forwarded += 1;
                Action::Forward(port as usize)
            }
        }
    }

    fn log_stats(&self) {
        let s = &self.stats;
        log::info!(
            "switch: forwarded {}, flooded {}, filtered {}, learned {} (failed {}), malformed {}",
            s.forwarded,
            s.flooded,
            s.filtered,
            s.learned,
            s.learn_failures,
            s.malformed
        );
        log::info!("switch: MAC table {}", self.table.stats());
    }
}

// ================================================================================================
//   UNITTESTS
// ================================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const A: [u8; 6] = [0x02, 0, 0, 0, 0, 0x0a];
    const B: [u8; 6] = [0x02, 0, 0, 0, 0, 0x0b];

    fn eth(dst: [u8; 6], src: [u8; 6], vlan: Option<u16>) -> Frame {
        let mut data = Vec::new();
        data.extend_from_slice(&dst);
        data.extend_from_slice(&src);
        if let Some(vlan) = vlan {
            data.extend_from_slice(&0x8100u16.to_be_bytes());
            data.extend_from_slice(&vlan.to_be_bytes());
        }
        data.extend_from_slice(&0x0800u16.to_be_bytes());
        data.resize(64, 0);
        Frame::from_bytes(&data)
    }

    fn switch() -> Switch {
        Switch::new(Arc::new(MacTable::create(64, 64).unwrap()), 1)
    }

    #[test]
    fn test_parse_l2() {
        let f = eth(B, A, Some(42));
        assert_eq!(
            parse_l2(f.data(), 1),
            Some((MacAddr::new(B), MacAddr::new(A), 42))
        );
        let f = eth(B, A, None);
        assert_eq!(parse_l2(f.data(), 7).map(|x| x.2), Some(7));
        assert_eq!(parse_l2(&[0; 10], 1), None);
    }

    #[test]
    fn test_learn_then_forward() {
        let mut sw = switch();
        // B unknown: flood
        assert_eq!(sw.forward(0, &mut eth(B, A, None)), Action::Flood { except: 0 });
        // A was learned on port 0
        assert_eq!(sw.forward(2, &mut eth(A, B, None)), Action::Forward(0));
        assert_eq!(sw.forward(0, &mut eth(B, A, None)), Action::Forward(2));
        assert_eq!(sw.stats().learned, 2);
    }

    #[test]
    fn test_station_move() {
        let mut sw = switch();
        sw.forward(0, &mut eth(B, A, None));
        sw.forward(3, &mut eth(B, A, None));
        assert_eq!(sw.table().get(MacAddr::new(A), 1), Some(3));
        assert_eq!(sw.table().len(), 1);
    }

    #[test]
    fn test_filter_same_port() {
        let mut sw = switch();
        sw.forward(1, &mut eth(B, A, None));
        assert_eq!(sw.forward(1, &mut eth(A, B, None)), Action::Drop);
        assert_eq!(sw.forward(1, &mut eth(B, A, None)), Action::Drop);
        assert_eq!(sw.stats().filtered, 2);
    }

    #[test]
    fn test_vlans_are_separate() {
        let mut sw = switch();
        sw.forward(0, &mut eth(B, A, Some(10)));
        // A is known on VLAN 10 only
        assert_eq!(sw.forward(1, &mut eth(A, B, Some(10))), Action::Forward(0));
        assert_eq!(sw.forward(1, &mut eth(A, B, Some(20))), Action::Flood { except: 1 });
    }

    #[test]
    fn test_broadcast_floods_and_multicast_source_not_learned() {
        let mut sw = switch();
        let bcast = MacAddr::BROADCAST.octets();
        assert_eq!(sw.forward(2, &mut eth(bcast, A, None)), Action::Flood { except: 2 });
        let mcast = [0x01, 0x00, 0x5e, 0, 0, 1];
        sw.forward(2, &mut eth(B, mcast, None));
        assert!(!sw.table().contains(MacAddr::new(mcast), 1));
        assert_eq!(sw.stats().flooded, 2);
    }

    #[test]
    fn test_full_table_still_switches() {
        let mut sw = Switch::new(Arc::new(MacTable::create(8, 1).unwrap()), 1);
        sw.forward(0, &mut eth(B, A, None));
        assert_eq!(sw.forward(1, &mut eth(A, B, None)), Action::Forward(0));
        assert_eq!(sw.stats().learn_failures, 1);
        // B could not be learned, so traffic towards it floods
        assert_eq!(sw.forward(0, &mut eth(B, A, None)), Action::Flood { except: 0 });
    }
}
