//! Packed IPv4 addresses as sent by principal servers

use std::net::Ipv4Addr;

/// Convert a packed address into dotted-quad notation
///
/// The four little-endian bytes of `packed` are the octets in order, so
/// `0x0100007F` becomes `127.0.0.1`. No further byte swap is applied.
pub fn int_to_ip(packed: u32) -> String {
    to_ipv4(packed).to_string()
}

pub fn to_ipv4(packed: u32) -> Ipv4Addr {
    Ipv4Addr::from(packed.to_le_bytes())
}

/// Inverse of [`to_ipv4`]
pub fn ipv4_to_int(addr: Ipv4Addr) -> u32 {
    u32::from_le_bytes(addr.octets())
}
