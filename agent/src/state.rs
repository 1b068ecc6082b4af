//! Desired state handed to the reconcilers once per cycle.
//!
//! [`ClusterState`] is what the cluster wants for this node. [`Snapshot`]
//! pairs it with the interface and namespace names that exist in the kernel
//! at the start of the cycle; nothing in a snapshot changes afterwards.

use std::collections::BTreeSet;

use hvnet_config::{naming, Settings};
use hvnet_iproute::IpRoute;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{mtu::MtuPolicy, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    pub node: NodeNetwork,
    pub instances: Vec<Instance>,
    pub vpcs: Vec<Vpc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Default,
    Vxlan,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeNetwork {
    pub name: String,
    pub hypervisor: bool,
    pub external_bridges: Vec<String>,
    pub internal_bridges: Vec<String>,
    pub host_block: Option<HostBlock>,
    pub host_nat: bool,
    /// Egress interface for host NAT. Empty means use the default route.
    pub default_interface: String,
    pub jumbo_frames: bool,
    pub jumbo_frames_internal: bool,
    pub network_mode: NetworkMode,
}

impl NodeNetwork {
    pub fn vxlan(&self) -> bool {
        self.network_mode == NetworkMode::Vxlan
    }
}

/// Host-only network assigned to this node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostBlock {
    /// Network CIDR, e.g. `198.18.84.0/22`.
    pub network: String,
    /// Gateway address with prefix, e.g. `198.18.84.1/22`.
    pub gateway: String,
}

impl HostBlock {
    pub fn gateway_cidr(&self) -> Option<String> {
        self.gateway
            .parse::<IpNet>()
            .ok()
            .map(|net| net.to_string())
    }

    pub fn network_cidr(&self) -> Option<String> {
        self.network
            .parse::<IpNet>()
            .ok()
            .map(|net| net.trunc().to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Provisioning,
    Starting,
    Running,
    Stopping,
    #[default]
    Stopped,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub state: InstanceState,
    pub adapters: Vec<NetworkAdapter>,
}

impl Instance {
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            InstanceState::Provisioning | InstanceState::Starting | InstanceState::Running
        )
    }

    /// Adapter attached to `vpc`, if any.
    pub fn adapter(&self, vpc: &str) -> Option<&NetworkAdapter> {
        self.adapters.iter().find(|adapter| adapter.vpc == vpc)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkAdapter {
    pub vpc: String,
    /// Overrides the generated namespace name.
    pub namespace: Option<String>,
    /// Overrides the generated MAC address.
    pub mac: Option<String>,
}

impl NetworkAdapter {
    pub fn namespace_for(&self, instance: &str, index: usize) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => ns.clone(),
            _ => naming::namespace_name(instance, index),
        }
    }

    pub fn mac_for(&self, instance: &str) -> String {
        match &self.mac {
            Some(mac) if !mac.is_empty() => mac.to_lowercase(),
            _ => naming::instance_mac(instance, &self.vpc),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vpc {
    pub id: String,
    /// Derive an IPv6 address for every lease that does not carry one.
    pub ipv6: bool,
    pub arps: Vec<ArpOverride>,
    pub ips: Vec<VpcIp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpOverride {
    pub ip: String,
    pub mac: String,
}

/// An address leased to an instance, or free when `instance` is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpcIp {
    pub address: String,
    pub address6: Option<String>,
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub cluster: ClusterState,
    /// Interface names present in the host namespace.
    pub interfaces: BTreeSet<String>,
    /// Network namespaces present on the host.
    pub namespaces: BTreeSet<String>,
}

impl Snapshot {
    /// Reads the live interface and namespace names once for this cycle.
    pub async fn build(cluster: ClusterState, iproute: &IpRoute) -> Result<Self> {
        let interfaces = iproute
            .handle_link()
            .list(None)
            .await?
            .into_iter()
            .map(|link| link.ifname)
            .collect();

        let namespaces = iproute
            .handle_netns()
            .list()
            .await?
            .into_iter()
            .map(|ns| ns.name)
            .collect();

        Ok(Self {
            cluster,
            interfaces,
            namespaces,
        })
    }

    pub fn node(&self) -> &NodeNetwork {
        &self.cluster.node
    }

    pub fn mtu_policy(&self, settings: &Settings) -> MtuPolicy {
        MtuPolicy::new(&self.cluster.node, settings)
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.cluster.instances.iter().find(|inst| inst.id == id)
    }

    pub fn vpc(&self, id: &str) -> Option<&Vpc> {
        self.cluster.vpcs.iter().find(|vpc| vpc.id == id)
    }
}

#[cfg(test)]
mod tests {
    use hvnet_iproute::testing::FakeExecutor;

    use super::*;

    const STATE: &str = r#"
node:
  name: hv-1
  hypervisor: true
  external_bridges: [br0, br1]
  host_block:
    network: 198.18.84.0/22
    gateway: 198.18.84.1/22
  host_nat: true
  network_mode: vxlan
instances:
  - id: inst-a
    state: running
    adapters:
      - vpc: vpc-v
        namespace: ns-A
vpcs:
  - id: vpc-v
    ips:
      - address: 10.0.0.5
        instance: inst-a
"#;

    #[test]
    fn test_parse_cluster_state() {
        let state: ClusterState = serde_yaml::from_str(STATE).unwrap();

        assert!(state.node.hypervisor);
        assert!(state.node.vxlan());
        assert_eq!(state.node.external_bridges, vec!["br0", "br1"]);
        assert!(state.instances[0].is_active());
        assert_eq!(state.vpcs[0].ips[0].instance.as_deref(), Some("inst-a"));
    }

    #[test]
    fn test_unknown_instance_state() {
        let inst: Instance = serde_yaml::from_str("id: x\nstate: migrating\n").unwrap();
        assert_eq!(inst.state, InstanceState::Unknown);
        assert!(!inst.is_active());
    }

    #[test]
    fn test_host_block() {
        let block = HostBlock {
            network: "198.18.84.7/22".into(),
            gateway: "198.18.84.1/22".into(),
        };
        assert_eq!(block.network_cidr().as_deref(), Some("198.18.84.0/22"));
        assert_eq!(block.gateway_cidr().as_deref(), Some("198.18.84.1/22"));

        let block = HostBlock {
            network: "198.18.84.0/22".into(),
            gateway: String::new(),
        };
        assert_eq!(block.gateway_cidr(), None);
    }

    #[test]
    fn test_adapter_namespace() {
        let adapter = NetworkAdapter {
            vpc: "vpc-v".into(),
            ..Default::default()
        };
        assert_eq!(
            adapter.namespace_for("inst-a", 0),
            naming::namespace_name("inst-a", 0)
        );

        let adapter = NetworkAdapter {
            namespace: Some("ns-A".into()),
            ..adapter
        };
        assert_eq!(adapter.namespace_for("inst-a", 0), "ns-A");
    }

    #[tokio::test]
    async fn test_snapshot_build() {
        let (exec, iproute) = FakeExecutor::iproute();
        exec.respond_ok(
            "ip --json link show",
            r#"[{"ifindex":1,"ifname":"lo"},{"ifindex":2,"ifname":"hvnethost0"}]"#,
        );
        exec.respond_ok("ip --json netns list", r#"[{"name":"ns-A","id":0}]"#);

        let snapshot = Snapshot::build(ClusterState::default(), &iproute)
            .await
            .unwrap();

        assert!(snapshot.interfaces.contains("hvnethost0"));
        assert!(snapshot.namespaces.contains("ns-A"));
        assert!(!snapshot.node().vxlan());
    }
}
