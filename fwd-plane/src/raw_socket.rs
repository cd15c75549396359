//! # AF_PACKET Raw Socket Transport
//!
//! ## Purpose
//!
//! Sends and receives whole Ethernet frames on a Linux interface through an
//! `AF_PACKET` / `SOCK_RAW` socket. Needs `CAP_NET_RAW`.
//!
//! ## How it works
//!
//! The socket is bound to one interface for all protocols (`ETH_P_ALL`) and is
//! non-blocking. The kernel also loops frames the host transmits on that
//! interface back to packet sockets; those carry `PACKET_OUTGOING` in the
//! source address and are skipped, so the dataplane never re-forwards its own
//! output. Optionally the interface is put in promiscuous mode through a packet
//! membership, which the kernel drops again when the socket closes.
//!
//! Receives use `MSG_TRUNC`, so the real length of a frame larger than the
//! buffer is known and the frame is dropped instead of forwarded cut short.

use crate::transport::{Frame, MIN_FRAME, Transport};
use fwd_table::MacAddr;
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd, RawFd};

pub struct RawSocket {
    fd: OwnedFd,
    name: String,
    if_index: u32,
    mac: MacAddr,
    outgoing_skipped: u64,
    oversize_dropped: u64,
}

/// What to do with one received frame.
#[derive(Debug, PartialEq, Eq)]
enum Received {
    Accept,
    /// Sent by this host.
    Outgoing,
    /// Shorter than an Ethernet header.
    Runt,
    /// Longer than the frame buffer; only a prefix was copied.
    Oversize,
}

/// `len` is the full frame length as reported with `MSG_TRUNC`.
fn classify(pkttype: u8, len: usize, capacity: usize) -> Received {
    if pkttype == libc::PACKET_OUTGOING {
        Received::Outgoing
    } else if len > capacity {
        Received::Oversize
    } else if len < MIN_FRAME {
        Received::Runt
    } else {
        Received::Accept
    }
}

impl RawSocket {
    /// Opens a raw socket on `if_name`, optionally enabling promiscuous mode.
    pub fn open(if_name: &str, promiscuous: bool) -> io::Result<Self> {
        let if_index = if_index_by_name(if_name)?;
        let protocol = (libc::ETH_P_ALL as u16).to_be();

        let fd = unsafe {
            let fd = libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol as libc::c_int,
            );
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            OwnedFd::from_raw_fd(fd)
        };

        unsafe {
            let mut sll: libc::sockaddr_ll = mem::zeroed();
            sll.sll_family = libc::AF_PACKET as u16;
            sll.sll_protocol = protocol;
            sll.sll_ifindex = if_index as libc::c_int;
            if libc::bind(
                fd.as_raw_fd(),
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            ) < 0
            {
                return Err(io::Error::last_os_error());
            }
        }

        if promiscuous {
            unsafe {
                let mut mreq: libc::packet_mreq = mem::zeroed();
                mreq.mr_ifindex = if_index as libc::c_int;
                mreq.mr_type = libc::PACKET_MR_PROMISC as u16;
                if libc::setsockopt(
                    fd.as_raw_fd(),
                    libc::SOL_PACKET,
                    libc::PACKET_ADD_MEMBERSHIP,
                    &mreq as *const libc::packet_mreq as *const libc::c_void,
                    mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
                ) < 0
                {
                    return Err(io::Error::last_os_error());
                }
            }
        }

        let mac = mac_by_name(if_name)?;
        log::info!("Opened raw socket on {if_name} (index {if_index}, mac {mac}, promisc {promiscuous})");
        Ok(RawSocket {
            fd,
            name: if_name.to_owned(),
            if_index,
            mac,
            outgoing_skipped: 0,
            oversize_dropped: 0,
        })
    }

    pub fn if_index(&self) -> u32 {
        self.if_index
    }

    /// Hardware address of the interface.
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Frames dropped because the host itself sent them.
    pub fn outgoing_skipped(&self) -> u64 {
        self.outgoing_skipped
    }

    /// Frames dropped because they did not fit a frame buffer.
    pub fn oversize_dropped(&self) -> u64 {
        self.oversize_dropped
    }
}

impl Transport for RawSocket {
    fn name(&self) -> &str {
        &self.name
    }

    fn recv_burst(&mut self, frames: &mut [Frame]) -> io::Result<usize> {
        let mut count = 0;
        while count < frames.len() {
            let buf = frames[count].buffer_mut();
            let capacity = buf.len();
            let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
            let mut sll_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
            let n = unsafe {
                libc::recvfrom(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    libc::MSG_DONTWAIT | libc::MSG_TRUNC,
                    &mut sll as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                    &mut sll_len,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => break,
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(err),
                }
            }
            match classify(sll.sll_pkttype, n as usize, capacity) {
                Received::Accept => {}
                Received::Outgoing => {
                    self.outgoing_skipped += 1;
                    continue;
                }
                Received::Oversize => {
                    if self.oversize_dropped == 0 {
                        log::warn!(
                            "{}: dropping frames over {capacity} bytes (jumbo MTU or GRO?)",
                            self.name
                        );
                    }
                    self.oversize_dropped += 1;
                    continue;
                }
                Received::Runt => continue,
            }
            let n = n as usize;
            frames[count].set_len(n);
            count += 1;
        }
        Ok(count)
    }

    fn send_burst(&mut self, frames: &[&[u8]]) -> io::Result<usize> {
        let mut sent = 0;
        while sent < frames.len() {
            let data = frames[sent];
            let n = unsafe {
                libc::send(
                    self.fd.as_raw_fd(),
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => break,
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(err),
                }
            }
            sent += 1;
        }
        Ok(sent)
    }

    fn readiness_fd(&self) -> Option<RawFd> {
        Some(self.fd.as_raw_fd())
    }
}

fn if_index_by_name(if_name: &str) -> io::Result<u32> {
    let c_name = CString::new(if_name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name contains NUL"))?;
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(io::Error::other(format!(
            "interface {if_name}: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(index)
}

/// Reads the interface hardware address with `SIOCGIFHWADDR`.
pub fn mac_by_name(if_name: &str) -> io::Result<MacAddr> {
    unsafe {
        let mut if_req: libc::ifreq = mem::zeroed();
        let name = if_name.as_bytes();
        if name.len() >= if_req.ifr_name.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("interface name {if_name} too long"),
            ));
        }
        for (dst, src) in if_req.ifr_name.iter_mut().zip(name) {
            *dst = *src as libc::c_char;
        }

        let socket_fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0);
        if socket_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let socket = OwnedFd::from_raw_fd(socket_fd);
        if libc::ioctl(socket.as_raw_fd(), libc::SIOCGIFHWADDR, &mut if_req) < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut octets = [0u8; 6];
        for (i, v) in if_req.ifr_ifru.ifru_hwaddr.sa_data[..6].iter().enumerate() {
            octets[i] = *v as u8;
        }
        Ok(MacAddr::new(octets))
    }
}
