//! IP-to-integer conversion and CIDR membership tests.
//!
//! Both address families are reduced to an unsigned integer so a subnet test
//! is a single masked comparison. The IPv6 reader is deliberately lenient: the
//! address is split on `:`, empty segments read as zero, and short forms are
//! right-padded to eight hextets. It does not expand `::` positionally, so
//! only already-expanded (or trailing-compressed) addresses compare correctly.
//! Downstream proxy tables rely on this behavior; do not tighten it without
//! migrating them.

/// Converts an IPv4 or IPv6 address to its integer form.
///
/// Family is detected by the presence of `:`. Returns `None` for anything
/// that does not read as an address in the detected family.
pub fn ip_to_integer(address: &str) -> Option<u128> {
    if address.contains(':') {
        ipv6_to_u128(address)
    } else {
        ipv4_to_u32(address).map(u128::from)
    }
}

/// Tests whether `address` falls inside the CIDR range `cidr`.
///
/// A mismatched address family, a malformed address, or a malformed CIDR all
/// yield `false`; this function never fails.
pub fn is_in_subnet(address: &str, cidr: &str) -> bool {
    if address.is_empty() || cidr.is_empty() {
        return false;
    }
    let Some((subnet, prefix_str)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix_str.trim().parse::<u32>() else {
        return false;
    };

    let v6 = address.contains(':');
    if v6 != subnet.contains(':') {
        return false;
    }
    let bits = if v6 { 128 } else { 32 };
    if prefix > bits {
        return false;
    }

    let (Some(addr), Some(net)) = (ip_to_integer(address), ip_to_integer(subnet)) else {
        return false;
    };

    // A mask of `prefix` leading one-bits within the family's width. Values
    // from ipv4_to_u32 occupy only the low 32 bits, so the excess high bits of
    // a u128 mask are harmless there.
    let host_bits = bits - prefix;
    let mask: u128 = if host_bits >= 128 { 0 } else { !0u128 << host_bits };

    addr & mask == net & mask
}

fn ipv4_to_u32(address: &str) -> Option<u32> {
    let mut value: u32 = 0;
    let mut count = 0;
    for part in address.split('.') {
        let octet: u8 = part.parse().ok()?;
        value = (value << 8) | u32::from(octet);
        count += 1;
    }
    (count == 4).then_some(value)
}

fn ipv6_to_u128(address: &str) -> Option<u128> {
    let parts: Vec<&str> = address.split(':').collect();
    if parts.len() > 8 {
        return None;
    }
    let mut value: u128 = 0;
    for part in &parts {
        let hextet = if part.is_empty() {
            0
        } else {
            u16::from_str_radix(part, 16).ok()?
        };
        value = (value << 16) | u128::from(hextet);
    }
    // Short forms pad with zero hextets on the right.
    Some(value << (16 * (8 - parts.len())))
}
