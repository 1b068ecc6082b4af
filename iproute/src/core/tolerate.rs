//! Error output treated as success, per call site.
//!
//! The wording comes from iproute2 and iptables and has changed between
//! releases before. When a distribution update breaks idempotent
//! reconciliation, these lists are the first place to look.

/// `ip neighbor del` of an entry that is already gone.
pub const NEIGH_DEL: &[&str] = &["No such file"];

/// `ip neighbor replace` racing a concurrent insert.
pub const NEIGH_REPLACE: &[&str] = &["File exists"];

/// `ip link add ... type bridge` for a bridge that already exists.
pub const LINK_ADD: &[&str] = &["File exists"];

/// `ip address show dev` / `ip addr flush dev` for a missing device.
pub const ADDR_MISSING_DEV: &[&str] = &["does not exist", "Cannot find device"];

/// `ip addr add` of an address the device already holds.
pub const ADDR_ADD: &[&str] = &["File exists"];

/// `iptables -D` of a rule that is not installed.
pub const NAT_DEL: &[&str] = &["matching rule exist", "No chain/target/match"];
