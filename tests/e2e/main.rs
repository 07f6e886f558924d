//! Kernel tests
//!
//! These create real links and need CAP_NET_ADMIN.
//! Run with: sudo -E cargo test --test e2e -- --ignored --test-threads=1

mod ip;

use ip::{Link, add_dummy, delete_link, kernel_stat, unique_name};
use viface::{LinkKind, PacketBuffer, RootPool, VirtualInterface};

/// Ether()/IP()/TCP()/Raw("I'm a packet!"*3), 93 bytes.
const REFERENCE_FRAME: [u8; 93] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x45, 0x00,
    0x00, 0x4F, 0x00, 0x01, 0x00, 0x00, 0x40, 0x06, 0x7C, 0xA6, 0x7F, 0x00, 0x00, 0x01, 0x7F, 0x00,
    0x00, 0x01, 0x00, 0x14, 0x00, 0x50, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x50, 0x02,
    0x20, 0x00, 0x04, 0x91, 0x00, 0x00, 0x49, 0x27, 0x6D, 0x20, 0x61, 0x20, 0x70, 0x61, 0x63, 0x6B,
    0x65, 0x74, 0x21, 0x49, 0x27, 0x6D, 0x20, 0x61, 0x20, 0x70, 0x61, 0x63, 0x6B, 0x65, 0x74, 0x21,
    0x49, 0x27, 0x6D, 0x20, 0x61, 0x20, 0x70, 0x61, 0x63, 0x6B, 0x65, 0x74, 0x21,
];

/// Create, configure, commit and tear down a TAP link.
#[test]
#[ignore] // Requires CAP_NET_ADMIN
fn test_tap_lifecycle() {
    let name = unique_name("vft");
    let root = RootPool::create().expect("Failed to create root pool");
    let mut iface =
        VirtualInterface::create(&root, &name, LinkKind::Tap, Some(1)).expect("create failed");

    iface.set_ipv4("192.168.25.46").unwrap();
    iface.set_netmask("255.255.255.0").unwrap();
    iface.set_broadcast("192.168.25.255").unwrap();
    iface.set_mac("ec:f1:f8:d5:47:6b").unwrap();
    iface.set_ipv6(&["2001:db8:25::46"]).unwrap();
    iface.set_mtu(1400).unwrap();
    iface.up().expect("up failed");

    let link = Link::show(&name).expect("link should exist while up");
    assert!(link.is_up(), "{} should be administratively up", name);
    assert_eq!(link.mtu(), Some(1400));
    assert_eq!(link.mac().as_deref(), Some("ec:f1:f8:d5:47:6b"));
    assert!(link.has_address("192.168.25.46/24"));
    assert_eq!(link.broadcast().as_deref(), Some("192.168.25.255"));
    assert!(link.has_address("2001:db8:25::46/64"));

    iface.down().expect("down failed");
    assert!(Link::show(&name).is_none(), "created link should be gone");

    iface.destroy().unwrap();
    root.destroy().unwrap();
}

/// Frames written by the interface are counted by the kernel.
#[test]
#[ignore] // Requires CAP_NET_ADMIN
fn test_send_counts_and_clear() {
    let name = unique_name("vfs");
    let root = RootPool::create().unwrap();
    let mut iface = VirtualInterface::create(&root, &name, LinkKind::Tap, None).unwrap();
    iface.up().unwrap();

    let packet = PacketBuffer::from_payload(&REFERENCE_FRAME).unwrap();
    iface.send(&packet).unwrap();

    let kernel = kernel_stat(&name, "rx_packets").unwrap();
    assert!(kernel >= 1);
    assert_eq!(iface.read_stat("rx_packets").unwrap(), kernel);

    iface.clear_stat("rx_packets").unwrap();
    assert_eq!(iface.read_stat("rx_packets").unwrap(), 0);
    // The kernel counter is untouched.
    assert_eq!(kernel_stat(&name, "rx_packets").unwrap(), kernel);

    assert!(iface.receive().is_ok());
    iface.down().unwrap();
}

/// An existing interface is attached rather than recreated.
#[test]
#[ignore] // Requires CAP_NET_ADMIN
fn test_attach_existing_interface() {
    let name = unique_name("vfd");
    add_dummy(&name).expect("Failed to create dummy link");

    let root = RootPool::create().unwrap();
    let mut iface = VirtualInterface::create(&root, &name, LinkKind::Tap, None).unwrap();
    iface.set_ipv4("10.77.0.1").unwrap();
    iface.set_netmask("255.255.255.0").unwrap();
    iface.up().expect("attach failed");

    let link = Link::show(&name).unwrap();
    assert!(link.has_address("10.77.0.1/24"));
    assert!(iface.rx_fd().is_some());

    iface.down().unwrap();
    let link = Link::show(&name).expect("attached link must survive down");
    assert!(!link.has_address("10.77.0.1/24"));

    drop(iface);
    delete_link(&name);
}

/// A TUN link has no hardware address to program.
#[test]
#[ignore] // Requires CAP_NET_ADMIN
fn test_tun_up() {
    let name = unique_name("vfu");
    let root = RootPool::create().unwrap();
    let mut iface = VirtualInterface::create(&root, &name, LinkKind::Tun, None).unwrap();
    iface.set_ipv4("10.78.0.1").unwrap();
    iface.up().expect("up failed");

    let link = Link::show(&name).unwrap();
    assert!(link.is_up());
    assert!(iface.rx_fd().is_some());
    assert!(iface.mac().is_some());

    iface.down().unwrap();
}
