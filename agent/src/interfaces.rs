//! Least-loaded bridge selection for new instance interfaces.
//!
//! The per-bridge member sets are a cache. They are refreshed from the
//! kernel at most once per TTL and bumped optimistically when a bridge is
//! handed out, so they may overcount until the next refresh.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Mutex,
    time::{Duration, Instant},
};

use hvnet_config::{naming, Settings};
use hvnet_iproute::IpRoute;
use tracing::{debug, info};

use crate::state::NodeNetwork;

#[derive(Debug, Default)]
struct Inner {
    ifaces: HashMap<String, BTreeSet<String>>,
    last_sync: Option<Instant>,
    jumbo: Option<bool>,
    external: Vec<String>,
    internal: Vec<String>,
}

pub struct BridgeLoad {
    iproute: IpRoute,
    ttl: Duration,
    default_bridge: String,
    inner: Mutex<Inner>,
}

/// Internal bridges as attached to, the vxlan bridges in vxlan mode.
pub(crate) fn internal_bridges(node: &NodeNetwork) -> Vec<String> {
    if !node.vxlan() {
        return node.internal_bridges.clone();
    }

    node.internal_bridges
        .iter()
        .map(|bridge| naming::vxlan_bridge_name(bridge))
        .collect()
}

impl BridgeLoad {
    pub fn new(iproute: IpRoute, settings: &Settings) -> Self {
        Self {
            iproute,
            ttl: settings.bridge_sync_ttl(),
            default_bridge: settings.default_bridge_name.clone(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-reads bridge membership unless the last read is younger than the
    /// TTL. `force` and a jumbo frame toggle skip the debounce.
    ///
    /// Returns whether the kernel was queried.
    pub async fn sync(&self, node: &NodeNetwork, force: bool) -> bool {
        {
            let mut inner = self.lock();
            inner.external = node.external_bridges.clone();
            inner.internal = internal_bridges(node);

            let toggled = inner.jumbo.map_or(false, |jumbo| jumbo != node.jumbo_frames);
            let fresh = inner.last_sync.map_or(false, |at| at.elapsed() < self.ttl);
            if !force && !toggled && fresh {
                return false;
            }

            if toggled {
                info!("jumbo frames toggled, resetting bridge load");
                inner.ifaces.clear();
            }
            inner.jumbo = Some(node.jumbo_frames);
        }

        self.refresh().await;
        true
    }

    /// Re-reads membership of the bridges seen by the last `sync`.
    pub async fn refresh(&self) {
        let bridges: Vec<String> = {
            let inner = self.lock();
            inner
                .external
                .iter()
                .chain(inner.internal.iter())
                .cloned()
                .collect()
        };

        let mut ifaces = HashMap::new();
        for bridge in bridges {
            match self.iproute.handle_link().list_master(&bridge).await {
                Ok(links) => {
                    let members: BTreeSet<String> = links
                        .into_iter()
                        .map(|link| link.ifname)
                        .filter(|name| name.len() == naming::VIRT_IFACE_LEN)
                        .collect();
                    ifaces.insert(bridge, members);
                }
                Err(e) => debug!(bridge = %bridge, "skipping bridge: {}", e),
            }
        }

        let mut inner = self.lock();
        inner.ifaces = ifaces;
        inner.last_sync = Some(Instant::now());
    }

    /// Bridge for a new external interface.
    pub fn external(&self, virt_iface: &str) -> String {
        let mut inner = self.lock();
        let candidates = inner.external.clone();
        self.select(&mut inner, &candidates, virt_iface)
    }

    /// Bridge for a new internal interface, the vxlan bridge in vxlan mode.
    pub fn internal(&self, virt_iface: &str) -> String {
        let mut inner = self.lock();
        let candidates = inner.internal.clone();
        self.select(&mut inner, &candidates, virt_iface)
    }

    fn select(&self, inner: &mut Inner, candidates: &[String], virt_iface: &str) -> String {
        let mut selected: Option<(&String, usize)> = None;

        for bridge in candidates {
            let Some(members) = inner.ifaces.get(bridge) else {
                continue;
            };

            if selected.map_or(true, |(_, len)| members.len() < len) {
                selected = Some((bridge, members.len()));
            }
        }

        match selected {
            Some((bridge, _)) => {
                if let Some(members) = inner.ifaces.get_mut(bridge) {
                    members.insert(virt_iface.to_owned());
                }
                inner.last_sync = Some(Instant::now());
                bridge.clone()
            }
            None if candidates.len() == 1 => candidates[0].clone(),
            None => self.default_bridge.clone(),
        }
    }

    /// Forgets a torn down interface on every bridge.
    pub fn remove(&self, virt_iface: &str) {
        let mut inner = self.lock();
        for members in inner.ifaces.values_mut() {
            members.remove(virt_iface);
        }
    }

    /// Tracked member count, `None` for untracked bridges.
    pub fn count(&self, bridge: &str) -> Option<usize> {
        self.lock().ifaces.get(bridge).map(BTreeSet::len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hvnet_iproute::testing::FakeExecutor;

    use super::*;
    use crate::state::NetworkMode;

    fn members(bridge: &str, n: usize) -> String {
        let links: Vec<String> = (0..n)
            .map(|i| {
                let name = naming::iface_name('e', &format!("{bridge}-{i}"), 0);
                format!(r#"{{"ifindex":{},"ifname":"{}","master":"{}"}}"#, 10 + i, name, bridge)
            })
            .chain(std::iter::once(format!(
                r#"{{"ifindex":99,"ifname":"eth{}","master":"{}"}}"#,
                n, bridge
            )))
            .collect();
        format!("[{}]", links.join(","))
    }

    fn load(counts: &[(&str, usize)]) -> (Arc<FakeExecutor>, BridgeLoad, NodeNetwork) {
        let (exec, iproute) = FakeExecutor::iproute();
        for (bridge, n) in counts {
            exec.respond_ok(
                &format!("ip --json link show master {}", bridge),
                &members(bridge, *n),
            );
        }

        let node = NodeNetwork {
            external_bridges: counts.iter().map(|(b, _)| b.to_string()).collect(),
            ..Default::default()
        };

        (exec, BridgeLoad::new(iproute, &Settings::default()), node)
    }

    #[tokio::test]
    async fn test_selects_least_loaded() {
        let (exec, load, node) = load(&[("br0", 3), ("br1", 1), ("br2", 2)]);
        assert!(load.sync(&node, false).await);
        assert_eq!(load.count("br0"), Some(3));

        let calls = exec.calls().len();
        assert_eq!(load.external("e00000000000a0"), "br1");
        assert_eq!(load.count("br1"), Some(2));
        assert_eq!(exec.calls().len(), calls);

        // br1 and br2 now tie at two, first seen wins
        assert_eq!(load.external("e00000000000b0"), "br1");
        assert_eq!(load.external("e00000000000c0"), "br2");
    }

    #[tokio::test]
    async fn test_sync_is_debounced() {
        let (exec, load, mut node) = load(&[("br0", 1)]);

        assert!(load.sync(&node, false).await);
        assert!(!load.sync(&node, false).await);
        assert_eq!(exec.calls().len(), 1);

        assert!(load.sync(&node, true).await);
        assert_eq!(exec.calls().len(), 2);

        node.jumbo_frames = true;
        assert!(load.sync(&node, false).await);
        assert_eq!(exec.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_remove_forgets_interface() {
        let (_exec, load, node) = load(&[("br0", 0), ("br1", 0)]);
        load.sync(&node, false).await;

        assert_eq!(load.external("e00000000000a0"), "br0");
        assert_eq!(load.count("br0"), Some(1));

        load.remove("e00000000000a0");
        assert_eq!(load.count("br0"), Some(0));
    }

    #[tokio::test]
    async fn test_fallback_bridges() {
        let (exec, iproute) = FakeExecutor::iproute();
        exec.respond_err("ip --json link show master br7", "Cannot find device \"br7\"");
        let load = BridgeLoad::new(iproute, &Settings::default());

        assert_eq!(load.external("e00000000000a0"), "br0");

        let node = NodeNetwork {
            external_bridges: vec!["br7".into()],
            ..Default::default()
        };
        load.sync(&node, true).await;
        assert_eq!(load.count("br7"), None);
        assert_eq!(load.external("e00000000000a0"), "br7");
    }

    #[tokio::test]
    async fn test_internal_uses_vxlan_bridges() {
        let (exec, iproute) = FakeExecutor::iproute();
        let vxlan = naming::vxlan_bridge_name("br9");
        exec.respond_ok(&format!("ip --json link show master {}", vxlan), &members(&vxlan, 1));

        let load = BridgeLoad::new(iproute, &Settings::default());
        let node = NodeNetwork {
            internal_bridges: vec!["br9".into()],
            network_mode: NetworkMode::Vxlan,
            ..Default::default()
        };
        load.sync(&node, false).await;

        assert_eq!(load.internal("i00000000000a1"), vxlan);
        assert_eq!(load.count(&vxlan), Some(2));
    }
}
