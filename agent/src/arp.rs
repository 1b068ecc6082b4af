//! Permanent neighbor entries inside instance namespaces.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

use hvnet_config::{naming, Settings};
use hvnet_iproute::{parse_mac, route::neigh::NeighborBuilder, IpRoute};
use tracing::{debug, error, info, warn};

use crate::{
    state::{Snapshot, Vpc},
    Error, Result,
};

/// One IP to MAC binding in a namespace's neighbor table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NeighborRecord {
    pub ip: IpAddr,
    pub mac: String,
}

impl NeighborRecord {
    /// Returns `None` when either side does not parse.
    pub fn new(ip: &str, mac: &str) -> Option<Self> {
        let ip = ip.parse().ok()?;
        parse_mac(mac).ok()?;

        Some(Self {
            ip,
            mac: mac.to_lowercase(),
        })
    }
}

pub type NeighborSet = BTreeSet<NeighborRecord>;

pub struct Arp {
    iproute: IpRoute,
    bridge: String,
}

impl Arp {
    pub fn new(iproute: IpRoute, settings: &Settings) -> Self {
        Self {
            iproute,
            bridge: settings.bridge_iface_name.clone(),
        }
    }

    /// Desired neighbor set per namespace of every active instance adapter.
    pub fn desired(&self, snapshot: &Snapshot) -> BTreeMap<String, NeighborSet> {
        let mut state = BTreeMap::new();

        for inst in snapshot.cluster.instances.iter().filter(|i| i.is_active()) {
            for (index, adapter) in inst.adapters.iter().enumerate() {
                let namespace = adapter.namespace_for(&inst.id, index);
                let records = match snapshot.vpc(&adapter.vpc) {
                    Some(vpc) => vpc_records(snapshot, vpc),
                    None => {
                        warn!(instance = %inst.id, vpc = %adapter.vpc, "adapter vpc not found");
                        NeighborSet::new()
                    }
                };

                state.insert(namespace, records);
            }
        }

        state
    }

    /// Permanent entries on the managed bridge in `namespace`.
    pub async fn actual(&self, namespace: &str) -> Result<NeighborSet> {
        let entries = self.iproute.handle_neigh().list(Some(namespace)).await?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.dev == self.bridge && entry.is_permanent())
            .filter_map(|entry| {
                let mac = entry.lladdr.as_deref()?;
                NeighborRecord::new(&entry.dst, mac)
            })
            .collect())
    }

    /// Removes `actual - desired`, then installs `desired - actual`.
    ///
    /// The first untolerated failure stops work on this namespace.
    pub async fn apply_state(
        &self,
        namespace: &str,
        actual: &NeighborSet,
        desired: &NeighborSet,
    ) -> Result<bool> {
        let mut changed = false;

        for record in actual.difference(desired) {
            changed = true;
            info!("[DEL][{}] {} -> {}", namespace, record.ip, record.mac);

            let neigh = NeighborBuilder::default()
                .dev(self.bridge.as_str())
                .ip_addr(Some(record.ip))
                .build()
                .map_err(|e| Error::Invalid(e.to_string()))?;

            self.iproute
                .handle_neigh()
                .del(Some(namespace), &neigh)
                .await?;
        }

        for record in desired.difference(actual) {
            changed = true;
            info!("[ADD][{}] {} -> {}", namespace, record.ip, record.mac);

            let neigh = NeighborBuilder::default()
                .dev(self.bridge.as_str())
                .ip_addr(Some(record.ip))
                .mac_addr(record.mac.as_str())
                .permanent(true)
                .build()
                .map_err(|e| Error::Invalid(e.to_string()))?;

            self.iproute
                .handle_neigh()
                .replace(Some(namespace), &neigh)
                .await?;
        }

        Ok(changed)
    }

    /// Converges every desired namespace that exists on the host.
    ///
    /// A failing namespace does not stop the others; the first error is
    /// returned after all of them were visited.
    pub async fn reconcile(&self, snapshot: &Snapshot) -> Result<bool> {
        let mut changed = false;
        let mut first_err = None;

        for (namespace, desired) in self.desired(snapshot) {
            if !snapshot.namespaces.contains(&namespace) {
                debug!(namespace = %namespace, "namespace not present, skipping");
                continue;
            }

            let result = match self.actual(&namespace).await {
                Ok(actual) => self.apply_state(&namespace, &actual, &desired).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(c) => changed |= c,
                Err(e) => {
                    error!(namespace = %namespace, "failed to sync neighbors: {}", e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }
}

/// One MAC per IP: a static override wins over a lease for the same address.
fn vpc_records(snapshot: &Snapshot, vpc: &Vpc) -> NeighborSet {
    let mut records = BTreeMap::new();

    for lease in &vpc.ips {
        let Some(owner) = lease.instance.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };

        let mac = snapshot
            .instance(owner)
            .and_then(|inst| inst.adapter(&vpc.id))
            .map(|adapter| adapter.mac_for(owner))
            .unwrap_or_else(|| naming::instance_mac(owner, &vpc.id));

        push_record(&mut records, &vpc.id, &lease.address, &mac);

        match lease.address6.as_deref().filter(|a| !a.is_empty()) {
            Some(address6) => push_record(&mut records, &vpc.id, address6, &mac),
            None if vpc.ipv6 => {
                let address6 = naming::instance_ip6(&vpc.id, owner).to_string();
                push_record(&mut records, &vpc.id, &address6, &mac);
            }
            None => {}
        }
    }

    for arp in &vpc.arps {
        push_record(&mut records, &vpc.id, &arp.ip, &arp.mac);
    }

    records
        .into_iter()
        .map(|(ip, mac)| NeighborRecord { ip, mac })
        .collect()
}

fn push_record(records: &mut BTreeMap<IpAddr, String>, vpc: &str, ip: &str, mac: &str) {
    match NeighborRecord::new(ip, mac) {
        Some(record) => {
            if let Some(old) = records.insert(record.ip, record.mac) {
                debug!(vpc = %vpc, "neighbor {} overridden, was {}", ip, old);
            }
        }
        None => warn!(vpc = %vpc, "ignoring invalid neighbor {} -> {}", ip, mac),
    }
}
