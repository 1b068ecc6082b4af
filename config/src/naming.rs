//! Deterministic names and addresses derived from resource ids.
//!
//! Everything here is a pure function of its inputs so a restarted agent
//! arrives at the same interface, namespace and MAC names it used before.

use std::net::Ipv6Addr;

use sha2::{Digest, Sha256};

/// Length of every generated interface and namespace name.
pub const VIRT_IFACE_LEN: usize = 14;

fn digest_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Locally administered looking MAC for an instance adapter, `00:` prefixed.
pub fn instance_mac(instance: &str, vpc: &str) -> String {
    let hash = digest_hex(&[instance, vpc]);

    let mut mac = String::from("00");
    for pair in hash.as_bytes()[..10].chunks(2) {
        mac.push(':');
        mac.push(pair[0] as char);
        mac.push(pair[1] as char);
    }

    mac
}

/// ULA address under `fd97::/16`: 48 bits from the VPC, 64 from the instance.
pub fn instance_ip6(vpc: &str, instance: &str) -> Ipv6Addr {
    let hex = format!(
        "fd97{}{}",
        &digest_hex(&[vpc])[..12],
        &digest_hex(&[instance])[..16]
    );

    let mut segments = [0u16; 8];
    for (i, seg) in segments.iter_mut().enumerate() {
        // hex digits only, cannot fail
        *seg = u16::from_str_radix(&hex[i * 4..i * 4 + 4], 16).unwrap_or_default();
    }

    Ipv6Addr::from(segments)
}

/// Interface name `<prefix><12 hex><n>`.
pub fn iface_name(prefix: char, instance: &str, n: usize) -> String {
    format!("{}{}{}", prefix, &digest_hex(&[instance])[..12], n % 10)
}

pub fn namespace_name(instance: &str, n: usize) -> String {
    iface_name('n', instance, n)
}

/// Bridge carrying the vxlan overlay for a physical bridge.
pub fn vxlan_bridge_name(parent: &str) -> String {
    format!("b{}", &digest_hex(&[parent])[..VIRT_IFACE_LEN - 1])
}
