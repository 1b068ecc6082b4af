use std::net::IpAddr;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AddrInfo {
    pub family: String,
    pub local: String,
    pub prefixlen: u8,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub dynamic: bool,
}

impl AddrInfo {
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.local, self.prefixlen)
    }
}

/// One entry of `ip --json address`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Iface {
    #[serde(default)]
    pub ifindex: u32,
    pub ifname: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub operstate: String,
    #[serde(default)]
    pub master: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub addr_info: Vec<AddrInfo>,
}

impl Iface {
    /// Preferred IPv4 address: global scope first, then link scope.
    pub fn ipv4(&self) -> Option<&AddrInfo> {
        self.pick("inet", |_| true)
    }

    /// Preferred IPv6 address, ignoring link-local `fe80::/10`.
    pub fn ipv6(&self) -> Option<&AddrInfo> {
        self.pick("inet6", |ip| match ip {
            IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
            IpAddr::V4(_) => false,
        })
    }

    fn pick(&self, family: &str, keep: impl Fn(&IpAddr) -> bool) -> Option<&AddrInfo> {
        let usable = |info: &&AddrInfo| {
            info.family == family
                && info
                    .local
                    .parse::<IpAddr>()
                    .map(|ip| !ip.is_loopback() && keep(&ip))
                    .unwrap_or(false)
        };

        self.addr_info
            .iter()
            .filter(usable)
            .find(|info| info.scope == "global")
            .or_else(|| {
                self.addr_info
                    .iter()
                    .filter(usable)
                    .find(|info| info.scope == "link")
            })
    }
}
