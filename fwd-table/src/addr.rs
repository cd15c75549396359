//! # Address Parsing and Formatting
//!
//! ## Purpose
//!
//! Text helpers used by whatever populates the tables: MAC addresses in
//! colon-hex form, MAC/IPv4/IPv6 CIDR prefixes, and the 48-bit integer packing
//! the CAM uses as part of its key.
//!
//! ## How it works
//!
//! MAC text must be exactly six colon-separated two-digit hex groups; the shape
//! is checked here and the digits are decoded by `eui48`. IP prefixes are split
//! at the `/`, the address is parsed by `std::net`, the depth is range checked
//! against the family width and the result is truncated to the prefix with
//! `ipnet`. Every parser is all-or-nothing: a malformed input yields an error
//! and no partial value.
//!
//! ## Main components
//!
//! - `MacAddr`: a 6-byte MAC address with `FromStr` and canonical `Display`.
//! - `str_to_mac()`, `mac_to_str()`, `mac_to_u64()`, `u64_to_mac()`.
//! - `parse_mac_cidr()`, `parse_ipv4_cidr()`, `parse_ipv6_cidr()`, and the
//!   family-detecting `parse_cidr()`.

use crate::error::ParseError;
use ipnet::{Ipv4Net, Ipv6Net};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Bits in a MAC address.
pub const MAC_BITS: u8 = 48;

const MAC_MASK: u64 = (1 << MAC_BITS) - 1;
const MAC_TEXT_LEN: usize = 17;

/// A 48-bit IEEE 802 MAC address, most significant octet first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group bit set in the first octet (broadcast included).
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn to_u64(&self) -> u64 {
        mac_to_u64(self)
    }

    pub fn from_u64(value: u64) -> Self {
        u64_to_mac(value)
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

impl From<MacAddr> for [u8; 6] {
    fn from(mac: MacAddr) -> Self {
        mac.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl FromStr for MacAddr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        str_to_mac(s)
    }
}

/// Parses `xx:xx:xx:xx:xx:xx`, hex digits in either case.
pub fn str_to_mac(text: &str) -> Result<MacAddr, ParseError> {
    if !has_mac_shape(text) {
        return Err(ParseError::Mac(text.to_owned()));
    }
    let mac = eui48::MacAddress::from_str(text).map_err(|_| ParseError::Mac(text.to_owned()))?;
    Ok(MacAddr(mac.to_array()))
}

fn has_mac_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == MAC_TEXT_LEN
        && bytes.iter().enumerate().all(|(i, c)| {
            if i % 3 == 2 {
                *c == b':'
            } else {
                c.is_ascii_hexdigit()
            }
        })
}

/// Formats a MAC in canonical lowercase colon-hex.
pub fn mac_to_str(mac: &MacAddr) -> String {
    mac.to_string()
}

/// Packs the address into the low 48 bits, first octet most significant.
pub fn mac_to_u64(mac: &MacAddr) -> u64 {
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(&mac.0);
    u64::from_be_bytes(buf)
}

/// Inverse of `mac_to_u64`. Bits above 48 are ignored.
pub fn u64_to_mac(value: u64) -> MacAddr {
    let buf = (value & MAC_MASK).to_be_bytes();
    let mut octets = [0u8; 6];
    octets.copy_from_slice(&buf[2..]);
    MacAddr(octets)
}

/// Builds a MAC from the first six bytes of a frame field.
pub fn mac_from_bytes(bytes: &[u8]) -> Option<MacAddr> {
    let octets: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
    Some(MacAddr(octets))
}

/// Parses `MAC/DEPTH` with depth in `0..=48`; bits past the depth are cleared.
pub fn parse_mac_cidr(text: &str) -> Result<(MacAddr, u8), ParseError> {
    let (addr, depth) = split_cidr(text)?;
    let depth = parse_depth(text, depth, MAC_BITS)?;
    let mac = str_to_mac(addr)?;
    let mask = if depth == 0 {
        0
    } else {
        MAC_MASK & !((1u64 << (MAC_BITS - depth)) - 1)
    };
    Ok((u64_to_mac(mac_to_u64(&mac) & mask), depth))
}

/// Parses a dotted-quad IPv4 address.
pub fn parse_ipv4(text: &str) -> Result<Ipv4Addr, ParseError> {
    Ipv4Addr::from_str(text).map_err(|_| ParseError::Ipv4(text.to_owned()))
}

/// Parses an IPv6 address in any RFC 5952 accepted form.
pub fn parse_ipv6(text: &str) -> Result<Ipv6Addr, ParseError> {
    Ipv6Addr::from_str(text).map_err(|_| ParseError::Ipv6(text.to_owned()))
}

/// Parses `A.B.C.D/DEPTH`, returning the network address and depth.
pub fn parse_ipv4_cidr(text: &str) -> Result<(Ipv4Addr, u8), ParseError> {
    let (addr, depth) = split_cidr(text)?;
    let depth = parse_depth(text, depth, 32)?;
    let addr = Ipv4Addr::from_str(addr).map_err(|_| ParseError::Ipv4(text.to_owned()))?;
    let net = Ipv4Net::new(addr, depth).map_err(|_| ParseError::Depth(text.to_owned()))?;
    Ok((net.trunc().addr(), depth))
}

/// Parses `ADDR/DEPTH` for IPv6, returning the network address and depth.
pub fn parse_ipv6_cidr(text: &str) -> Result<(Ipv6Addr, u8), ParseError> {
    let (addr, depth) = split_cidr(text)?;
    let depth = parse_depth(text, depth, 128)?;
    let addr = Ipv6Addr::from_str(addr).map_err(|_| ParseError::Ipv6(text.to_owned()))?;
    let net = Ipv6Net::new(addr, depth).map_err(|_| ParseError::Depth(text.to_owned()))?;
    Ok((net.trunc().addr(), depth))
}

/// A parsed prefix of any supported family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cidr {
    Mac(MacAddr, u8),
    V4(Ipv4Addr, u8),
    V6(Ipv6Addr, u8),
}

impl Cidr {
    pub fn depth(&self) -> u8 {
        match *self {
            Cidr::Mac(_, d) | Cidr::V4(_, d) | Cidr::V6(_, d) => d,
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cidr::Mac(a, d) => write!(f, "{a}/{d}"),
            Cidr::V4(a, d) => write!(f, "{a}/{d}"),
            Cidr::V6(a, d) => write!(f, "{a}/{d}"),
        }
    }
}

impl FromStr for Cidr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_cidr(s)
    }
}

/// Parses a MAC, IPv4 or IPv6 prefix, choosing the family from the text.
///
/// Six colon-separated pairs of hex digits are a MAC (no valid IPv6 literal
/// has six groups and no `::`). Any other colon means IPv6, embedded dotted
/// quads included. The rest is tried as IPv4.
pub fn parse_cidr(text: &str) -> Result<Cidr, ParseError> {
    let (addr, _) = split_cidr(text)?;
    if has_mac_shape(addr) {
        let (a, d) = parse_mac_cidr(text)?;
        Ok(Cidr::Mac(a, d))
    } else if addr.contains(':') {
        let (a, d) = parse_ipv6_cidr(text)?;
        Ok(Cidr::V6(a, d))
    } else {
        let (a, d) = parse_ipv4_cidr(text)?;
        Ok(Cidr::V4(a, d))
    }
}

fn split_cidr(text: &str) -> Result<(&str, &str), ParseError> {
    match text.split_once('/') {
        Some((addr, depth)) if !addr.is_empty() && !depth.is_empty() => Ok((addr, depth)),
        _ => Err(ParseError::Format(text.to_owned())),
    }
}

// Plain decimal only: no sign, no whitespace, at most three digits.
fn parse_depth(text: &str, depth: &str, max: u8) -> Result<u8, ParseError> {
    if depth.len() > 3 || !depth.bytes().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::Depth(text.to_owned()));
    }
    match depth.parse::<u16>() {
        Ok(d) if d <= max as u16 => Ok(d as u8),
        _ => Err(ParseError::Depth(text.to_owned())),
    }
}

//
// ================================================================================================
//   UNITTESTS
// ================================================================================================
//
#[cfg(test)]
mod tests {
    use super::*;

    const MACS: [(&str, u64); 20] = [
        ("00:00:00:00:00:00", 0x000000000000),
        ("ff:ff:ff:ff:ff:ff", 0xffffffffffff),
        ("ab:cd:ef:12:34:56", 0xabcdef123456),
        ("12:34:56:ab:cd:ef", 0x123456abcdef),
        ("ca:fe:ba:be:f0:0d", 0xcafebabef00d),
        ("de:ad:c0:de:da:7a", 0xdeadc0deda7a),
        ("00:ff:00:ff:00:ff", 0x00ff00ff00ff),
        ("11:11:11:11:11:11", 0x111111111111),
        ("88:88:88:88:88:88", 0x888888888888),
        ("a1:b2:c3:d4:e5:f6", 0xa1b2c3d4e5f6),
        ("98:76:54:32:10:fe", 0x9876543210fe),
        ("00:a0:c9:14:c8:29", 0x00a0c914c829),
        ("f8:e7:d6:c5:b4:a3", 0xf8e7d6c5b4a3),
        ("08:00:20:0a:bc:de", 0x0800200abcde),
        ("52:54:00:ab:cd:ef", 0x525400abcdef),
        ("00:50:56:11:22:33", 0x005056112233),
        ("00:0c:29:aa:bb:cc", 0x000c29aabbcc),
        ("00:16:3e:44:55:66", 0x00163e445566),
        ("02:42:ac:1f:00:0a", 0x0242ac1f000a),
        ("fa:ce:b0:0c:c0:ff", 0xfaceb00cc0ff),
    ];

    #[test]
    fn test_mac_u64_table() {
        for (text, expected) in MACS {
            let mac = str_to_mac(text).unwrap();
            assert_eq!(mac_to_u64(&mac), expected, "{text}");
            let back = u64_to_mac(expected);
            assert_eq!(back, mac);
            assert_eq!(mac_to_str(&back), text);
        }
    }

    #[test]
    fn test_mac_case_insensitive() {
        let mac = str_to_mac("Dd:Ee:Ff:11:22:33").unwrap();
        assert_eq!(mac_to_u64(&mac), 0xddeeff112233);
        assert_eq!(mac.to_string(), "dd:ee:ff:11:22:33");
        assert_eq!(str_to_mac("AB:CD:EF:01:23:45").unwrap().to_u64(), 0xabcdef012345);
    }

    #[test]
    fn test_mac_rejects_malformed() {
        for bad in [
            "",
            "00:00:00:00:00",
            "00:00:00:00:00:00:00",
            "00-11-22-33-44-55",
            "0:11:22:33:44:555",
            "00:11:22:33:44:5g",
            "00:11:22:33:44:55 ",
            "0x001122334455",
            "001122334455",
        ] {
            assert!(str_to_mac(bad).is_err(), "{bad:?} must be rejected");
        }
    }

    #[test]
    fn test_u64_to_mac_ignores_high_bits() {
        assert_eq!(u64_to_mac(0xffff_0000_0000_0001), MacAddr([0, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn test_mac_flags() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(str_to_mac("01:00:5e:01:02:03").unwrap().is_multicast());
        assert!(!str_to_mac("02:11:22:33:44:55").unwrap().is_multicast());
    }

    #[test]
    fn test_mac_cidr() {
        assert_eq!(parse_mac_cidr("00:00:00:00:00:00/0").unwrap(), (MacAddr::ZERO, 0));
        let (mac, depth) = parse_mac_cidr("ab:cd:ef:12:34:56/24").unwrap();
        assert_eq!(depth, 24);
        assert_eq!(mac.to_u64(), 0xabcdef000000);
        let (mac, depth) = parse_mac_cidr("12:34:56:ab:cd:ef/48").unwrap();
        assert_eq!((mac.to_u64(), depth), (0x123456abcdef, 48));
        assert!(parse_mac_cidr("12:34:56:ab:cd:ef/49").is_err());
        assert!(parse_mac_cidr("12:34:56:ab:cd:ef").is_err());
    }

    #[test]
    fn test_ipv4_cidr() {
        assert_eq!(
            parse_ipv4_cidr("11.22.33.64/26").unwrap(),
            (Ipv4Addr::new(11, 22, 33, 64), 26)
        );
        assert_eq!(parse_ipv4_cidr("0.0.0.0/0").unwrap(), (Ipv4Addr::UNSPECIFIED, 0));
        assert_eq!(
            parse_ipv4_cidr("10.1.2.3/8").unwrap(),
            (Ipv4Addr::new(10, 0, 0, 0), 8)
        );
        assert_eq!(
            parse_ipv4_cidr("1.0.0.1/32").unwrap(),
            (Ipv4Addr::new(1, 0, 0, 1), 32)
        );
        for bad in [
            "10.0.0.0/33",
            "10.0.0.256/8",
            "10.0.0/8",
            "10.0.0.0/",
            "/8",
            "10.0.0.0/8x",
            "10.0.0.0/+8",
            "10.0.0.0/ 8",
            "10.0.0.0 /8",
            "10.0.0.0/8/8",
            "10.0.0.0",
        ] {
            assert!(parse_ipv4_cidr(bad).is_err(), "{bad:?} must be rejected");
        }
        assert_eq!(
            parse_ipv4_cidr("10.0.0.0/33"),
            Err(ParseError::Depth("10.0.0.0/33".to_owned()))
        );
    }

    #[test]
    fn test_ipv6_cidr() {
        let (addr, depth) = parse_ipv6_cidr("2001:db8:a:b:c::/80").unwrap();
        assert_eq!(depth, 80);
        assert_eq!(addr, "2001:db8:a:b:c::".parse::<Ipv6Addr>().unwrap());
        assert_eq!(
            parse_ipv6_cidr("fe80::1/10").unwrap(),
            ("fe80::".parse().unwrap(), 10)
        );
        assert_eq!(parse_ipv6_cidr("::/0").unwrap(), (Ipv6Addr::UNSPECIFIED, 0));
        for bad in ["2001:db8::/129", "2001:db8:::/32", "2001:dg8::/32", "2001:db8::"] {
            assert!(parse_ipv6_cidr(bad).is_err(), "{bad:?} must be rejected");
        }
    }

    #[test]
    fn test_parse_cidr_family_detection() {
        assert_eq!(
            parse_cidr("192.168.100.0/25").unwrap(),
            Cidr::V4(Ipv4Addr::new(192, 168, 100, 0), 25)
        );
        assert!(matches!(parse_cidr("2400:cb00::/32").unwrap(), Cidr::V6(_, 32)));
        assert!(matches!(parse_cidr("ab:cd:ef:12:34:56/24").unwrap(), Cidr::Mac(_, 24)));
        assert_eq!(parse_cidr("fd12:3456::/32").unwrap().to_string(), "fd12:3456::/32");
        assert!(matches!(parse_cidr("1111::2222:3333:4/64").unwrap(), Cidr::V6(_, 64)));
        assert!(matches!(parse_cidr("::ffff:1.2.3.4/120").unwrap(), Cidr::V6(_, 120)));
        assert!(parse_cidr("garbage").is_err());
    }
}
