//! # Command-Line Configuration
//!
//! ## Purpose
//!
//! `clap` argument sets for the three applications, plus the value types for
//! the table entries given on the command line and the builders that turn
//! them into populated tables.
//!
//! ## How it works
//!
//! Every address in an argument goes through the `fwd_table` codec, so the
//! command line accepts exactly what the tables' text helpers accept:
//!
//! - `CIDR=NEXT_HOP` adds a route; the CIDR family picks the IPv4 or IPv6 table.
//! - `NEXT_HOP=IP,MAC,PORT` defines the neighbour a next-hop id resolves to.
//! - `MAC@VLAN=PORT` pins a static entry in the switch's MAC table.
//! - `PORT=MAC` overrides the MAC a router port uses as frame source.
//!
//! Ports are positions in the interface list. Builders check every port
//! against it.

use crate::router::{Neighbor, Router};
use clap::{Args, Parser};
use fwd_table::{
    CamConfig, Cidr, Ipv4Lpm, Ipv6Lpm, LpmConfig, MacAddr, MacTable, ParseError, TableError,
    parse_cidr, parse_ipv4, parse_ipv6, str_to_mac,
};
use std::io;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("expected {expected}, got {text:?}")]
    Syntax { expected: &'static str, text: String },

    #[error("invalid number {0:?}")]
    Number(String),

    #[error(transparent)]
    Address(#[from] ParseError),

    #[error("port {port} out of range, {ports} interfaces configured")]
    Port { port: usize, ports: usize },

    #[error("patch needs an even number of interfaces, got {0}")]
    OddPatch(usize),

    #[error("{what}: {source}")]
    Table {
        what: String,
        #[source]
        source: TableError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn split_pair<'a>(
    text: &'a str,
    sep: char,
    expected: &'static str,
) -> Result<(&'a str, &'a str), ConfigError> {
    text.split_once(sep)
        .filter(|(a, b)| !a.is_empty() && !b.is_empty())
        .ok_or_else(|| ConfigError::Syntax {
            expected,
            text: text.to_owned(),
        })
}

fn number<T: FromStr>(text: &str) -> Result<T, ConfigError> {
    text.parse().map_err(|_| ConfigError::Number(text.to_owned()))
}

fn ip_addr(text: &str) -> Result<IpAddr, ParseError> {
    if text.contains(':') {
        parse_ipv6(text).map(IpAddr::V6)
    } else {
        parse_ipv4(text).map(IpAddr::V4)
    }
}

fn table_err(what: String) -> impl FnOnce(TableError) -> ConfigError {
    move |source| ConfigError::Table { what, source }
}

fn check_port(port: usize, ports: usize) -> Result<(), ConfigError> {
    if port < ports {
        Ok(())
    } else {
        Err(ConfigError::Port { port, ports })
    }
}

/// `CIDR=NEXT_HOP`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteSpec {
    pub prefix: Cidr,
    pub next_hop: u32,
}

impl FromStr for RouteSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, next_hop) = split_pair(s, '=', "CIDR=NEXT_HOP")?;
        Ok(RouteSpec {
            prefix: parse_cidr(prefix)?,
            next_hop: number(next_hop)?,
        })
    }
}

/// `NEXT_HOP=IP,MAC,PORT`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborSpec {
    pub id: u32,
    pub neighbor: Neighbor,
}

impl FromStr for NeighborSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const EXPECTED: &str = "NEXT_HOP=IP,MAC,PORT";
        let (id, rest) = split_pair(s, '=', EXPECTED)?;
        let fields: Vec<&str> = rest.split(',').collect();
        let [ip, mac, port] = fields[..] else {
            return Err(ConfigError::Syntax {
                expected: EXPECTED,
                text: s.to_owned(),
            });
        };
        Ok(NeighborSpec {
            id: number(id)?,
            neighbor: Neighbor {
                ip: ip_addr(ip)?,
                mac: str_to_mac(mac)?,
                port: number(port)?,
            },
        })
    }
}

/// `MAC@VLAN=PORT`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticMac {
    pub mac: MacAddr,
    pub vlan: u16,
    pub port: u32,
}

impl FromStr for StaticMac {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, port) = split_pair(s, '=', "MAC@VLAN=PORT")?;
        let (mac, vlan) = split_pair(key, '@', "MAC@VLAN=PORT")?;
        Ok(StaticMac {
            mac: str_to_mac(mac)?,
            vlan: number(vlan)?,
            port: number(port)?,
        })
    }
}

/// `PORT=MAC`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMac {
    pub port: usize,
    pub mac: MacAddr,
}

impl FromStr for PortMac {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, mac) = split_pair(s, '=', "PORT=MAC")?;
        Ok(PortMac {
            port: number(port)?,
            mac: str_to_mac(mac)?,
        })
    }
}

/// Interface options shared by every application.
#[derive(Args, Debug, Clone)]
pub struct PortArgs {
    /// Interfaces to attach, in port order
    #[arg(required = true, value_name = "IFACE")]
    pub interfaces: Vec<String>,

    /// Frames received per port per iteration
    #[arg(short, long, default_value_t = crate::dataplane::DEFAULT_BURST)]
    pub burst: usize,

    /// Leave the interfaces out of promiscuous mode
    #[arg(long)]
    pub no_promiscuous: bool,
}

/// Cross-connects interfaces pairwise: 0<->1, 2<->3, ...
#[derive(Parser, Debug, Clone)]
#[command(name = "l2-patch", version, arg_required_else_help = true)]
pub struct PatchArgs {
    #[command(flatten)]
    pub ports: PortArgs,
}

impl PatchArgs {
    /// Peer of every port.
    pub fn peers(&self) -> Result<Vec<Option<usize>>, ConfigError> {
        let n = self.ports.interfaces.len();
        if n % 2 != 0 {
            return Err(ConfigError::OddPatch(n));
        }
        Ok((0..n).map(|port| Some(port ^ 1)).collect())
    }
}

/// Learning switch across all interfaces.
#[derive(Parser, Debug, Clone)]
#[command(name = "l2-switch", version, arg_required_else_help = true)]
pub struct SwitchArgs {
    #[command(flatten)]
    pub ports: PortArgs,

    /// VLAN of untagged frames
    #[arg(long, default_value_t = 1)]
    pub native_vlan: u16,

    /// Hash buckets of the MAC table
    #[arg(long, default_value_t = CamConfig::default().num_buckets)]
    pub buckets: usize,

    /// Maximum stations in the MAC table
    #[arg(long, default_value_t = CamConfig::default().max_entries)]
    pub max_entries: usize,

    /// Static MAC table entry
    #[arg(long = "static", value_name = "MAC@VLAN=PORT")]
    pub static_macs: Vec<StaticMac>,
}

impl SwitchArgs {
    /// Creates the MAC table and installs the static entries.
    pub fn mac_table(&self) -> Result<MacTable, ConfigError> {
        let table = MacTable::with_config(&CamConfig {
            num_buckets: self.buckets,
            max_entries: self.max_entries,
        })
        .map_err(table_err("MAC table".into()))?;
        for entry in &self.static_macs {
            check_port(entry.port as usize, self.ports.interfaces.len())?;
            table
                .add(entry.mac, entry.vlan, entry.port)
                .map_err(table_err(format!("static entry {}@{}", entry.mac, entry.vlan)))?;
        }
        Ok(table)
    }
}

/// Static IPv4/IPv6 router across all interfaces.
#[derive(Parser, Debug, Clone)]
#[command(name = "l3-router", version, arg_required_else_help = true)]
pub struct RouterArgs {
    #[command(flatten)]
    pub ports: PortArgs,

    /// Route to a next hop
    #[arg(short, long = "route", value_name = "CIDR=NEXT_HOP")]
    pub routes: Vec<RouteSpec>,

    /// Neighbour a next-hop id resolves to
    #[arg(short, long = "neighbor", value_name = "NEXT_HOP=IP,MAC,PORT")]
    pub neighbors: Vec<NeighborSpec>,

    /// Source MAC used on a port instead of the interface address
    #[arg(long = "port-mac", value_name = "PORT=MAC")]
    pub port_macs: Vec<PortMac>,

    /// Rule capacity of each routing table
    #[arg(long, default_value_t = LpmConfig::default().max_rules)]
    pub max_rules: usize,

    /// Back the tables with huge pages (default: when enough are free)
    #[arg(long)]
    pub huge_pages: Option<bool>,
}

impl RouterArgs {
    /// Creates both routing tables and installs the routes.
    pub fn tables(&self) -> Result<(Ipv4Lpm, Ipv6Lpm), ConfigError> {
        let config = LpmConfig {
            max_rules: self.max_rules,
            max_blocks: None,
            huge_page: self.huge_pages,
        };
        let v4 = Ipv4Lpm::with_config(&config).map_err(table_err("IPv4 table".into()))?;
        let v6 = Ipv6Lpm::with_config(&config).map_err(table_err("IPv6 table".into()))?;
        for route in &self.routes {
            let added = match route.prefix {
                Cidr::V4(prefix, depth) => v4.add(prefix, depth, route.next_hop),
                Cidr::V6(prefix, depth) => v6.add(prefix, depth, route.next_hop),
                Cidr::Mac(..) => {
                    return Err(ConfigError::Syntax {
                        expected: "an IPv4 or IPv6 prefix",
                        text: route.prefix.to_string(),
                    });
                }
            };
            added.map_err(table_err(format!("route {}", route.prefix)))?;
        }
        Ok((v4, v6))
    }

    /// Builds the router. `interface_macs` holds the hardware address of each
    /// port; `--port-mac` entries override them.
    pub fn router(
        &self,
        v4: Arc<Ipv4Lpm>,
        v6: Arc<Ipv6Lpm>,
        mut interface_macs: Vec<MacAddr>,
    ) -> Result<Router, ConfigError> {
        let ports = self.ports.interfaces.len();
        interface_macs.resize(ports, MacAddr::ZERO);
        for pm in &self.port_macs {
            check_port(pm.port, ports)?;
            interface_macs[pm.port] = pm.mac;
        }
        let mut router = Router::new(v4, v6, interface_macs);
        for spec in &self.neighbors {
            check_port(spec.neighbor.port, ports)?;
            router.add_neighbor(spec.id, spec.neighbor.clone())?;
        }
        Ok(router)
    }
}
