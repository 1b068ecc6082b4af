//! Host-only bridge, its gateway address and the optional masquerade rule.

use std::sync::Arc;

use hvnet_config::Settings;
use hvnet_iproute::{HostNatRule, IpRoute};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{cache::AddressCache, state::Snapshot, Result};

#[derive(Debug, Default)]
struct HostNetState {
    initialized: bool,
    current_gateway: Option<String>,
    current_nat: Option<HostNatRule>,
}

pub struct HostNet {
    iproute: IpRoute,
    bridge: String,
    comment: String,
    cache: Arc<AddressCache>,
    state: Mutex<HostNetState>,
}

impl HostNet {
    pub fn new(iproute: IpRoute, settings: &Settings, cache: Arc<AddressCache>) -> Self {
        Self {
            iproute,
            bridge: settings.host_network_name.clone(),
            comment: settings.nat_comment.clone(),
            cache,
            state: Mutex::new(HostNetState::default()),
        }
    }

    /// Adopts whatever the kernel already has, once per process.
    async fn init(&self, state: &mut HostNetState) -> Result<()> {
        let iface = self.iproute.handle_addr().show(&self.bridge).await?;
        state.current_gateway = iface.and_then(|iface| iface.ipv4().map(|addr| addr.cidr()));

        let rules = self.iproute.handle_nat().list(&self.comment).await?;
        match rules.len() {
            0 => state.current_nat = None,
            1 => {
                info!("adopting host nat rule {}", rules[0]);
                state.current_nat = rules.into_iter().next();
            }
            n => {
                warn!("found {} host nat rules, removing all", n);
                for rule in &rules {
                    self.iproute.handle_nat().del(rule, &self.comment).await?;
                }
                state.current_nat = None;
            }
        }

        state.initialized = true;
        Ok(())
    }

    async fn egress(&self, snapshot: &Snapshot) -> Option<String> {
        let configured = &snapshot.node().default_interface;
        if !configured.is_empty() {
            return Some(configured.clone());
        }

        self.cache.default_interface().await
    }

    pub async fn reconcile(&self, snapshot: &Snapshot) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            self.init(&mut state).await?;
        }

        let mut changed = false;
        let node = snapshot.node();

        if !snapshot.interfaces.contains(&self.bridge) {
            info!(bridge = %self.bridge, "creating host bridge");
            self.iproute.handle_link().bridge_add(&self.bridge).await?;
            state.current_gateway = None;
            changed = true;
        }

        let block = node.host_block.as_ref();
        let Some(gateway) = block.and_then(|b| b.gateway_cidr()) else {
            warn!(bridge = %self.bridge, "host network has no usable gateway");
            if state.current_gateway.take().is_some() {
                self.iproute.handle_addr().flush(&self.bridge).await?;
                changed = true;
            }
            return Ok(changed);
        };

        if state.current_gateway.as_deref() != Some(gateway.as_str()) {
            info!(bridge = %self.bridge, "setting host gateway {}", gateway);

            let link = self.iproute.handle_link();
            link.up(&self.bridge).await?;

            let addr = self.iproute.handle_addr();
            addr.flush(&self.bridge).await?;
            state.current_gateway = None;
            addr.add(&gateway, &self.bridge).await?;

            state.current_gateway = Some(gateway);
            changed = true;
        }

        let source = block.and_then(|b| b.network_cidr());
        match (node.host_nat, source) {
            (true, Some(source)) => match self.egress(snapshot).await {
                // an unknown egress never replaces an installed rule
                None if state.current_nat.as_ref().map_or(false, |r| r.source == source) => {
                    warn!("egress interface unknown, keeping host nat rule");
                }
                egress => {
                    let desired = HostNatRule::new(source, egress.unwrap_or_default());
                    if state.current_nat.as_ref() != Some(&desired) {
                        changed |= self.replace_nat(&mut state, desired).await?;
                    }
                }
            },
            (true, None) => {
                warn!("host nat enabled without a valid host network");
                changed |= self.remove_nat(&mut state).await?;
            }
            (false, _) => changed |= self.remove_nat(&mut state).await?,
        }

        Ok(changed)
    }

    async fn replace_nat(&self, state: &mut HostNetState, desired: HostNatRule) -> Result<bool> {
        let nat = self.iproute.handle_nat();

        if let Some(old) = state.current_nat.take() {
            info!("removing host nat rule {}", old);
            if let Err(e) = nat.del(&old, &self.comment).await {
                state.current_nat = Some(old);
                return Err(e.into());
            }
        }

        info!("adding host nat rule {}", desired);
        match nat.add(&desired, &self.comment).await {
            Ok(()) => state.current_nat = Some(desired),
            Err(e) => error!("failed to add host nat rule {}: {}", desired, e),
        }

        Ok(true)
    }

    async fn remove_nat(&self, state: &mut HostNetState) -> Result<bool> {
        let Some(old) = state.current_nat.take() else {
            return Ok(false);
        };

        info!("removing host nat rule {}", old);
        if let Err(e) = self.iproute.handle_nat().del(&old, &self.comment).await {
            state.current_nat = Some(old);
            return Err(e.into());
        }

        Ok(true)
    }
}
