use std::sync::Arc;

use hvnet_config::Settings;
use hvnet_iproute::IpRoute;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    arp::Arp, cache::AddressCache, hostnet::HostNet, interfaces::BridgeLoad, mtu::MtuNormalizer,
    runner::Phase, state::Snapshot, Result,
};

/// Per-node network reconcilers, run in a fixed order.
pub struct Network {
    hostnet: HostNet,
    bridges: Arc<BridgeLoad>,
    mtu: MtuNormalizer,
    arp: Arp,
}

impl Network {
    pub fn new(
        iproute: IpRoute,
        settings: &Settings,
        bridges: Arc<BridgeLoad>,
        cache: Arc<AddressCache>,
    ) -> Self {
        Self {
            hostnet: HostNet::new(iproute.clone(), settings, cache),
            bridges,
            mtu: MtuNormalizer::new(iproute.clone(), settings),
            arp: Arp::new(iproute, settings),
        }
    }

    /// Runs host bridge/NAT, bridge load sync, MTU and neighbor reconciliation.
    ///
    /// Each reconciler reports on its own; a failure does not skip the
    /// following ones. Stops between reconcilers once `token` is cancelled.
    pub async fn reconcile(
        &self,
        snapshot: &Snapshot,
        token: &CancellationToken,
    ) -> Vec<(Phase, Result<bool>)> {
        let mut results = Vec::with_capacity(4);

        results.push((Phase::HostNet, self.hostnet.reconcile(snapshot).await));
        if token.is_cancelled() {
            return results;
        }

        let queried = self.bridges.sync(snapshot.node(), false).await;
        debug!("bridge load synced: {}", queried);
        results.push((Phase::Bridges, Ok(false)));
        if token.is_cancelled() {
            return results;
        }

        results.push((Phase::Mtu, self.mtu.reconcile(snapshot).await));
        if token.is_cancelled() {
            return results;
        }

        results.push((Phase::Arp, self.arp.reconcile(snapshot).await));
        results
    }
}
