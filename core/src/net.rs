// Bogon address classification
//
// A relay must announce a publicly routable address. Anything from a
// private, reserved or otherwise non-routable range ("bogon") is rejected
// at record verification unless the caller runs in bypass mode.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns true if the address comes from a reserved/private range that
/// should never appear as a public relay address.
pub fn is_bogon(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_bogon_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_bogon_v4(v4),
            None => is_bogon_v6(v6),
        },
    }
}

fn is_bogon_v4(addr: Ipv4Addr) -> bool {
    let [a, b, c, _] = addr.octets();
    addr.is_unspecified()
        || addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_multicast()
        || addr.is_broadcast()
        || a == 0
        // carrier-grade NAT 100.64.0.0/10
        || (a == 100 && (64..128).contains(&b))
        // IETF protocol assignments 192.0.0.0/24, TEST-NET-1 192.0.2.0/24
        || (a == 192 && b == 0 && (c == 0 || c == 2))
        // 6to4 anycast 192.88.99.0/24
        || (a == 192 && b == 88 && c == 99)
        // benchmarking 198.18.0.0/15
        || (a == 198 && (b == 18 || b == 19))
        // TEST-NET-2 198.51.100.0/24
        || (a == 198 && b == 51 && c == 100)
        // TEST-NET-3 203.0.113.0/24
        || (a == 203 && b == 0 && c == 113)
        // reserved 240.0.0.0/4
        || a >= 240
}

fn is_bogon_v6(addr: Ipv6Addr) -> bool {
    let seg = addr.segments();
    addr.is_unspecified()
        || addr.is_loopback()
        || addr.is_multicast()
        // unique-local fc00::/7
        || (seg[0] & 0xfe00) == 0xfc00
        // link-local fe80::/10
        || (seg[0] & 0xffc0) == 0xfe80
}
