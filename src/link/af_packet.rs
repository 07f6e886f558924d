//! AF_PACKET socket used to attach to an interface that already exists

use crate::{Error, Result};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// Raw packet socket bound to one interface, non-blocking.
#[derive(Debug)]
pub struct AfPacketSocket {
    fd: OwnedFd,
    ifindex: i32,
}

impl AfPacketSocket {
    /// Create a new AF_PACKET socket bound to the specified interface
    pub fn bind(ifname: &str) -> Result<Self> {
        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            )
        };
        if raw < 0 {
            return Err(Error::os("open packet socket", ifname, io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let ifindex = get_ifindex(fd.as_raw_fd(), ifname)?;

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: (libc::ETH_P_ALL as u16).to_be(),
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };

        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::os("bind packet socket", ifname, io::Error::last_os_error()));
        }

        Ok(Self { fd, ifindex })
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }
}

impl AsRawFd for AfPacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for AfPacketSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Fills the name field of a zeroed `ifreq`. The caller has validated the
/// name, so it fits with room for the terminating NUL.
pub(crate) fn ifreq_for(ifname: &str) -> libc::ifreq {
    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    let max = ifr.ifr_name.len() - 1;
    for (dst, src) in ifr.ifr_name.iter_mut().zip(ifname.bytes().take(max)) {
        *dst = src as libc::c_char;
    }
    ifr
}

/// Resolves an interface name to its kernel index.
pub(crate) fn get_ifindex(fd: RawFd, ifname: &str) -> Result<i32> {
    let mut ifr = ifreq_for(ifname);

    let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
    if ret < 0 {
        return Err(Error::os("resolve interface index", ifname, io::Error::last_os_error()));
    }

    Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ifreq_for_truncates_and_terminates() {
        let ifr = ifreq_for("viface0");
        assert_eq!(ifr.ifr_name[0] as u8, b'v');
        assert_eq!(ifr.ifr_name[6] as u8, b'0');
        assert_eq!(ifr.ifr_name[7], 0);

        let ifr = ifreq_for("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(ifr.ifr_name[ifr.ifr_name.len() - 1], 0);
    }

    #[test]
    fn test_bind_missing_interface_fails() {
        // Either the socket is refused (no CAP_NET_RAW) or the name lookup fails.
        let err = AfPacketSocket::bind("viface-nope0").unwrap_err();
        assert!(matches!(err, Error::Os { .. }));
    }
}
