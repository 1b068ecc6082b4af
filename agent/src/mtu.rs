use std::collections::HashSet;

use hvnet_config::{naming::VIRT_IFACE_LEN, Settings};
use hvnet_iproute::IpRoute;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{
    interfaces::internal_bridges,
    state::{NodeNetwork, Snapshot},
    Result,
};

/// Target MTU for each class of managed bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtuPolicy {
    pub external: u32,
    pub internal: u32,
    pub host: u32,
}

impl MtuPolicy {
    pub fn new(node: &NodeNetwork, settings: &Settings) -> Self {
        let external = if node.jumbo_frames {
            settings.jumbo_mtu
        } else {
            settings.normal_mtu
        };

        let host = if node.jumbo_frames || node.jumbo_frames_internal {
            settings.jumbo_mtu
        } else {
            settings.normal_mtu
        };

        let internal = if node.vxlan() {
            host.saturating_sub(settings.vxlan_overhead)
        } else {
            host
        };

        Self {
            external,
            internal,
            host,
        }
    }
}

#[derive(Debug, Default)]
struct Memo {
    policy: Option<MtuPolicy>,
    corrected: HashSet<String>,
}

pub struct MtuNormalizer {
    iproute: IpRoute,
    host_bridge: String,
    settings: Settings,
    memo: Mutex<Memo>,
}

impl MtuNormalizer {
    pub fn new(iproute: IpRoute, settings: &Settings) -> Self {
        Self {
            iproute,
            host_bridge: settings.host_network_name.clone(),
            settings: settings.clone(),
            memo: Mutex::new(Memo::default()),
        }
    }

    fn targets(&self, snapshot: &Snapshot, policy: &MtuPolicy) -> Vec<(String, u32)> {
        let node = snapshot.node();
        let internal = internal_bridges(node).into_iter();

        node.external_bridges
            .iter()
            .map(|bridge| (bridge.clone(), policy.external))
            .chain(internal.map(|bridge| (bridge, policy.internal)))
            .chain(std::iter::once((self.host_bridge.clone(), policy.host)))
            .filter(|(bridge, _)| snapshot.interfaces.contains(bridge))
            .collect()
    }

    /// Sets the policy MTU on instance interfaces attached to managed bridges.
    ///
    /// Interfaces already handled under the current policy are not checked
    /// again. Failures are logged per interface.
    pub async fn reconcile(&self, snapshot: &Snapshot) -> Result<bool> {
        let policy = snapshot.mtu_policy(&self.settings);
        let mut memo = self.memo.lock().await;

        if memo.policy != Some(policy) {
            if memo.policy.is_some() {
                info!("mtu policy changed to {:?}, rechecking interfaces", policy);
            }
            memo.corrected.clear();
            memo.policy = Some(policy);
        }

        let mut changed = false;
        let mut seen = HashSet::new();

        for (bridge, mtu) in self.targets(snapshot, &policy) {
            let links = self.iproute.handle_link().list_master(&bridge).await?;

            for link in links {
                if link.ifname.len() < VIRT_IFACE_LEN {
                    continue;
                }
                seen.insert(link.ifname.clone());

                if memo.corrected.contains(&link.ifname) {
                    continue;
                }

                if link.mtu != mtu {
                    info!(bridge = %bridge, "setting mtu of {} from {} to {}", link.ifname, link.mtu, mtu);
                    if let Err(e) = self.iproute.handle_link().set_mtu(&link.ifname, mtu).await {
                        error!(iface = %link.ifname, "failed to set mtu: {}", e);
                        continue;
                    }
                    changed = true;
                } else {
                    debug!("mtu of {} already {}", link.ifname, mtu);
                }

                memo.corrected.insert(link.ifname);
            }
        }

        memo.corrected.retain(|name| seen.contains(name));
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hvnet_iproute::testing::FakeExecutor;

    use super::*;
    use crate::state::{ClusterState, NetworkMode};

    const VIRT: &str = "e3f2a9c1b0d4e0";
    const LIST: &str = "ip --json link show master br0";

    fn member(mtu: u32) -> String {
        format!(
            r#"[{{"ifindex":10,"ifname":"{VIRT}","mtu":{mtu},"master":"br0"}},{{"ifindex":2,"ifname":"eth0","mtu":1400,"master":"br0"}}]"#
        )
    }

    fn normalizer() -> (Arc<FakeExecutor>, MtuNormalizer) {
        let (exec, iproute) = FakeExecutor::iproute();
        (exec, MtuNormalizer::new(iproute, &Settings::default()))
    }

    fn snapshot(jumbo: bool) -> Snapshot {
        Snapshot {
            cluster: ClusterState {
                node: NodeNetwork {
                    external_bridges: vec!["br0".into()],
                    jumbo_frames: jumbo,
                    ..Default::default()
                },
                ..Default::default()
            },
            interfaces: ["br0".to_owned()].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_policy() {
        let settings = Settings::default();
        let mut node = NodeNetwork::default();

        assert_eq!(
            MtuPolicy::new(&node, &settings),
            MtuPolicy {
                external: 1500,
                internal: 1500,
                host: 1500
            }
        );

        node.jumbo_frames_internal = true;
        node.network_mode = NetworkMode::Vxlan;
        assert_eq!(
            MtuPolicy::new(&node, &settings),
            MtuPolicy {
                external: 1500,
                internal: 8950,
                host: 9000
            }
        );

        node.jumbo_frames = true;
        assert_eq!(MtuPolicy::new(&node, &settings).external, 9000);
    }

    #[tokio::test]
    async fn test_corrected_once_per_policy() {
        let (exec, mtu) = normalizer();
        exec.respond_ok(LIST, &member(9000));

        assert!(mtu.reconcile(&snapshot(false)).await.unwrap());
        assert_eq!(exec.mutations(), vec![format!("ip link set dev {VIRT} mtu 1500")]);

        // kernel still reports the old value, memo wins
        exec.take_calls();
        assert!(!mtu.reconcile(&snapshot(false)).await.unwrap());
        assert!(exec.mutations().is_empty());

        exec.take_calls();
        exec.respond_ok(LIST, &member(1500));
        assert!(mtu.reconcile(&snapshot(true)).await.unwrap());
        assert_eq!(exec.mutations(), vec![format!("ip link set dev {VIRT} mtu 9000")]);
    }

    #[tokio::test]
    async fn test_failed_set_is_retried() {
        let (exec, mtu) = normalizer();
        exec.respond_ok(LIST, &member(9000));
        exec.respond_err(
            &format!("ip link set dev {VIRT} mtu 1500"),
            "RTNETLINK answers: Invalid argument",
        );

        assert!(!mtu.reconcile(&snapshot(false)).await.unwrap());
        assert!(!mtu.reconcile(&snapshot(false)).await.unwrap());
        assert_eq!(exec.mutations().len(), 2);
    }

    #[tokio::test]
    async fn test_skips_absent_bridges() {
        let (exec, mtu) = normalizer();
        let snapshot = Snapshot {
            interfaces: Default::default(),
            ..snapshot(false)
        };

        assert!(!mtu.reconcile(&snapshot).await.unwrap());
        assert!(exec.calls().is_empty());
    }
}
