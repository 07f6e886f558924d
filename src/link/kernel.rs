//! Linux kernel backend: `/dev/net/tun`, `AF_PACKET`, ioctl and sysfs

use super::af_packet::{AfPacketSocket, get_ifindex, ifreq_for};
use super::{LinkBackend, LinkKind, LinkOrigin, LinkQueues};
use crate::mac::MacAddr;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TUNSETIFF: libc::Ioctl = 0x400454ca as libc::Ioctl;
const IFF_MULTI_QUEUE: libc::c_int = 0x0100;

const TUN_DEVICE: &str = "/dev/net/tun";
const SYSFS_NET: &str = "/sys/class/net";

#[repr(C)]
struct In6Ifreq {
    ifr6_addr: libc::in6_addr,
    ifr6_prefixlen: u32,
    ifr6_ifindex: libc::c_int,
}

/// Drives real kernel interfaces. Requires `CAP_NET_ADMIN`.
#[derive(Debug)]
pub struct KernelBackend {
    inet: OwnedFd,
    inet6: OwnedFd,
    sysfs: PathBuf,
}

impl KernelBackend {
    /// Opens the control sockets used for ioctl requests.
    pub fn new() -> Result<Self> {
        Ok(Self {
            inet: control_socket(libc::AF_INET)?,
            inet6: control_socket(libc::AF_INET6)?,
            sysfs: PathBuf::from(SYSFS_NET),
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.sysfs.join(name).exists()
    }

    fn ioctl(
        &self,
        fd: RawFd,
        request: libc::Ioctl,
        ifr: &mut libc::ifreq,
        op: &'static str,
        name: &str,
    ) -> Result<()> {
        let ret = unsafe { libc::ioctl(fd, request, ifr as *mut libc::ifreq) };
        if ret < 0 {
            return Err(Error::os(op, name, io::Error::last_os_error()));
        }
        Ok(())
    }

    fn set_inet(
        &self,
        name: &str,
        request: libc::Ioctl,
        addr: Ipv4Addr,
        op: &'static str,
    ) -> Result<()> {
        let mut ifr = ifreq_for(name);
        ifr.ifr_ifru.ifru_addr = sockaddr_v4(addr);
        self.ioctl(self.inet.as_raw_fd(), request, &mut ifr, op, name)
    }

    fn ipv6_request(
        &self,
        name: &str,
        request: libc::Ioctl,
        addr: Ipv6Addr,
        prefix_len: u8,
        op: &'static str,
    ) -> Result<()> {
        let ifindex = get_ifindex(self.inet.as_raw_fd(), name)?;
        let mut req = In6Ifreq {
            ifr6_addr: libc::in6_addr {
                s6_addr: addr.octets(),
            },
            ifr6_prefixlen: prefix_len as u32,
            ifr6_ifindex: ifindex,
        };
        let ret = unsafe { libc::ioctl(self.inet6.as_raw_fd(), request, &mut req as *mut In6Ifreq) };
        if ret < 0 {
            return Err(Error::os(op, name, io::Error::last_os_error()));
        }
        Ok(())
    }

    fn open_tun_queue(&self, name: &str, kind: LinkKind) -> Result<OwnedFd> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(TUN_DEVICE)
            .map_err(|e| Error::os("open tun device", name, e))?;

        let mode = match kind {
            LinkKind::Tap => libc::IFF_TAP,
            LinkKind::Tun => libc::IFF_TUN,
        };
        let mut ifr = ifreq_for(name);
        ifr.ifr_ifru.ifru_flags = (mode | libc::IFF_NO_PI | IFF_MULTI_QUEUE) as libc::c_short;

        let ret = unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF, &mut ifr as *mut libc::ifreq) };
        if ret < 0 {
            return Err(Error::os("create link queue", name, io::Error::last_os_error()));
        }

        Ok(OwnedFd::from(file))
    }
}

impl LinkBackend for KernelBackend {
    fn open(&mut self, name: &str, kind: LinkKind) -> Result<LinkQueues> {
        if self.exists(name) {
            info!("Attaching to existing interface {}...", name);
            let rx = AfPacketSocket::bind(name)?;
            let tx = AfPacketSocket::bind(name)?;
            debug!("Interface {} has index {}", name, rx.ifindex());
            return Ok(LinkQueues {
                rx: rx.into_fd(),
                tx: tx.into_fd(),
                origin: LinkOrigin::Attached,
            });
        }

        info!("Creating {} interface {}...", kind, name);
        let rx = self.open_tun_queue(name, kind)?;
        let tx = self.open_tun_queue(name, kind)?;
        Ok(LinkQueues {
            rx,
            tx,
            origin: LinkOrigin::Created,
        })
    }

    fn release(&mut self, name: &str, queues: LinkQueues) -> Result<()> {
        let origin = queues.origin;
        queues.close().map_err(|e| Error::os("close link queues", name, e))?;
        if origin == LinkOrigin::Created {
            debug!("Removed interface {}", name);
        }
        Ok(())
    }

    fn mac(&mut self, name: &str) -> Result<MacAddr> {
        let mut ifr = ifreq_for(name);
        self.ioctl(
            self.inet.as_raw_fd(),
            libc::SIOCGIFHWADDR,
            &mut ifr,
            "read MAC address",
            name,
        )?;
        let data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
        let mut mac = [0u8; 6];
        for (dst, src) in mac.iter_mut().zip(data.iter()) {
            *dst = *src as u8;
        }
        Ok(MacAddr(mac))
    }

    fn set_mac(&mut self, name: &str, mac: MacAddr) -> Result<()> {
        let mut ifr = ifreq_for(name);
        unsafe {
            ifr.ifr_ifru.ifru_hwaddr.sa_family = libc::ARPHRD_ETHER;
            for (dst, src) in ifr.ifr_ifru.ifru_hwaddr.sa_data.iter_mut().zip(mac.0) {
                *dst = src as libc::c_char;
            }
        }
        self.ioctl(
            self.inet.as_raw_fd(),
            libc::SIOCSIFHWADDR,
            &mut ifr,
            "set MAC address",
            name,
        )
    }

    fn mtu(&mut self, name: &str) -> Result<u32> {
        let mut ifr = ifreq_for(name);
        self.ioctl(self.inet.as_raw_fd(), libc::SIOCGIFMTU, &mut ifr, "read MTU", name)?;
        Ok(unsafe { ifr.ifr_ifru.ifru_mtu } as u32)
    }

    fn set_mtu(&mut self, name: &str, mtu: u32) -> Result<()> {
        let mut ifr = ifreq_for(name);
        ifr.ifr_ifru.ifru_mtu = mtu as libc::c_int;
        self.ioctl(self.inet.as_raw_fd(), libc::SIOCSIFMTU, &mut ifr, "set MTU", name)
    }

    fn set_ipv4(&mut self, name: &str, addr: Ipv4Addr) -> Result<()> {
        self.set_inet(name, libc::SIOCSIFADDR, addr, "set IPv4 address")
    }

    fn set_netmask(&mut self, name: &str, mask: Ipv4Addr) -> Result<()> {
        self.set_inet(name, libc::SIOCSIFNETMASK, mask, "set netmask")
    }

    fn set_broadcast(&mut self, name: &str, addr: Ipv4Addr) -> Result<()> {
        self.set_inet(name, libc::SIOCSIFBRDADDR, addr, "set broadcast address")
    }

    fn clear_ipv4(&mut self, name: &str) -> Result<()> {
        // Assigning 0.0.0.0 deletes the primary address.
        self.set_inet(
            name,
            libc::SIOCSIFADDR,
            Ipv4Addr::UNSPECIFIED,
            "remove IPv4 address",
        )
    }

    fn add_ipv6(&mut self, name: &str, addr: Ipv6Addr, prefix_len: u8) -> Result<()> {
        self.ipv6_request(name, libc::SIOCSIFADDR, addr, prefix_len, "add IPv6 address")
    }

    fn del_ipv6(&mut self, name: &str, addr: Ipv6Addr, prefix_len: u8) -> Result<()> {
        self.ipv6_request(name, libc::SIOCDIFADDR, addr, prefix_len, "remove IPv6 address")
    }

    fn set_admin_up(&mut self, name: &str, up: bool) -> Result<()> {
        let mut ifr = ifreq_for(name);
        self.ioctl(
            self.inet.as_raw_fd(),
            libc::SIOCGIFFLAGS,
            &mut ifr,
            "read interface flags",
            name,
        )?;
        unsafe {
            if up {
                ifr.ifr_ifru.ifru_flags |= libc::IFF_UP as libc::c_short;
            } else {
                ifr.ifr_ifru.ifru_flags &= !(libc::IFF_UP as libc::c_short);
            }
        }
        self.ioctl(
            self.inet.as_raw_fd(),
            libc::SIOCSIFFLAGS,
            &mut ifr,
            "set interface flags",
            name,
        )
    }

    fn read_stat(&mut self, name: &str, stat: &str) -> Result<u64> {
        read_counter(&self.sysfs.join(name).join("statistics").join(stat))
            .map_err(|e| Error::os("read statistic", name, e))
    }
}

fn control_socket(domain: libc::c_int) -> Result<OwnedFd> {
    let fd = unsafe { libc::socket(domain, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    // SAFETY: `fd` is a freshly created descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn sockaddr_v4(addr: Ipv4Addr) -> libc::sockaddr {
    let sin = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: 0,
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.octets()),
        },
        sin_zero: [0; 8],
    };
    // SAFETY: sockaddr_in and sockaddr have the same size and alignment.
    unsafe { std::mem::transmute::<libc::sockaddr_in, libc::sockaddr>(sin) }
}

fn read_counter(path: &Path) -> io::Result<u64> {
    let text = std::fs::read_to_string(path)?;
    text.trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
