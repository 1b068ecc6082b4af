//! The convergence loop.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use hvnet_config::Settings;
use hvnet_iproute::IpRoute;
use tokio::{sync::RwLock, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cache::AddressCache,
    interfaces::BridgeLoad,
    metrics::Metrics,
    network::Network,
    server::state::{Diagnostics, Role},
    source::StateSource,
    state::Snapshot,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Snapshot,
    Deploy,
    HostNet,
    Bridges,
    Mtu,
    Arp,
    Firewall,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Snapshot => "snapshot",
            Phase::Deploy => "deploy",
            Phase::HostNet => "hostnet",
            Phase::Bridges => "bridges",
            Phase::Mtu => "mtu",
            Phase::Arp => "arp",
            Phase::Firewall => "firewall",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Starts and stops instances. Gets the bridge allocator for new interfaces.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, snapshot: &Snapshot, bridges: &BridgeLoad) -> Result<()>;
}

/// Applies compiled firewall rules.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Full rule application on hypervisor nodes.
    async fn apply(&self, snapshot: &Snapshot) -> Result<()>;

    /// Node level rules only, for nodes without instances.
    async fn sync_node(&self, snapshot: &Snapshot) -> Result<()>;
}

pub struct NoopDeployer;

#[async_trait]
impl Deployer for NoopDeployer {
    async fn deploy(&self, snapshot: &Snapshot, _bridges: &BridgeLoad) -> Result<()> {
        debug!(
            "no deployer configured, {} instances left as is",
            snapshot.cluster.instances.len()
        );
        Ok(())
    }
}

pub struct NoopFirewall;

#[async_trait]
impl Firewall for NoopFirewall {
    async fn apply(&self, _snapshot: &Snapshot) -> Result<()> {
        debug!("no firewall configured");
        Ok(())
    }

    async fn sync_node(&self, _snapshot: &Snapshot) -> Result<()> {
        debug!("no firewall configured");
        Ok(())
    }
}

/// Loop outputs read by the web server.
pub struct Context {
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub metrics: Metrics,
}

/// Time to wait before the next cycle: what is left of `period`, at least `floor`.
pub fn next_sleep(period: Duration, elapsed: Duration, floor: Duration) -> Duration {
    period.saturating_sub(elapsed).max(floor)
}

pub struct Runner {
    settings: Settings,
    iproute: IpRoute,
    source: Arc<dyn StateSource>,
    bridges: Arc<BridgeLoad>,
    cache: Arc<AddressCache>,
    network: Network,
    deployer: Arc<dyn Deployer>,
    firewall: Arc<dyn Firewall>,
    ctx: Context,
}

impl Runner {
    pub fn new(
        settings: &Settings,
        iproute: IpRoute,
        source: Arc<dyn StateSource>,
        ctx: Context,
    ) -> Self {
        let bridges = Arc::new(BridgeLoad::new(iproute.clone(), settings));
        let cache = Arc::new(AddressCache::new(
            iproute.clone(),
            settings.address_refresh_ttl(),
        ));
        let network = Network::new(iproute.clone(), settings, bridges.clone(), cache.clone());

        Self {
            settings: settings.clone(),
            iproute,
            source,
            bridges,
            cache,
            network,
            deployer: Arc::new(NoopDeployer),
            firewall: Arc::new(NoopFirewall),
            ctx,
        }
    }

    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = deployer;
        self
    }

    pub fn with_firewall(mut self, firewall: Arc<dyn Firewall>) -> Self {
        self.firewall = firewall;
        self
    }

    pub fn bridges(&self) -> Arc<BridgeLoad> {
        self.bridges.clone()
    }

    pub fn cache(&self) -> Arc<AddressCache> {
        self.cache.clone()
    }

    async fn record(&self, phase: Phase, result: Result<bool>) {
        let mut diagnostics = self.ctx.diagnostics.write().await;

        match result {
            Ok(changed) => {
                diagnostics.last_errors.remove(phase.as_str());
                if changed {
                    self.ctx.metrics.changed(phase.as_str());
                }
            }
            Err(e) => {
                error!(phase = %phase, "cycle phase failed: {}", e);
                self.ctx.metrics.phase_failure(phase.as_str(), &e);
                diagnostics
                    .last_errors
                    .insert(phase.as_str().to_owned(), e.to_string());
            }
        }
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let cluster = self.source.load().await?;
        Snapshot::build(cluster, &self.iproute).await
    }

    /// One pass over every phase. Returns early once `token` is cancelled.
    pub async fn cycle(&self, token: &CancellationToken) {
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.record(Phase::Snapshot, Err(e)).await;
                return;
            }
        };
        self.record(Phase::Snapshot, Ok(false)).await;

        let hypervisor = snapshot.node().hypervisor;
        self.ctx.diagnostics.write().await.role = if hypervisor {
            Role::Hypervisor
        } else {
            Role::Node
        };

        if !hypervisor {
            let result = self.firewall.sync_node(&snapshot).await;
            self.record(Phase::Firewall, result.map(|_| false)).await;
            return;
        }

        if token.is_cancelled() {
            return;
        }
        let result = self.deployer.deploy(&snapshot, &self.bridges).await;
        self.record(Phase::Deploy, result.map(|_| false)).await;

        if token.is_cancelled() {
            return;
        }
        for (phase, result) in self.network.reconcile(&snapshot, token).await {
            self.record(phase, result).await;
        }

        if token.is_cancelled() {
            return;
        }
        let result = self.firewall.apply(&snapshot).await;
        self.record(Phase::Firewall, result.map(|_| false)).await;
    }

    pub async fn run(self, token: CancellationToken) {
        info!("starting convergence loop");

        let period = self.settings.cycle_period();
        let floor = self.settings.cycle_floor();
        let slow = self.settings.slow_cycle();

        while !token.is_cancelled() {
            let start = Instant::now();
            {
                let _timer = self.ctx.metrics.count_and_measure();
                self.ctx.diagnostics.write().await.last_cycle = Some(Utc::now());
                self.cycle(&token).await;
            }
            let elapsed = start.elapsed();

            {
                let mut diagnostics = self.ctx.diagnostics.write().await;
                diagnostics.cycles += 1;
                diagnostics.last_elapsed_ms = elapsed.as_millis() as u64;
            }

            if elapsed > slow {
                warn!("slow convergence cycle: {}ms", elapsed.as_millis());
                self.ctx.metrics.slow_cycle();
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(next_sleep(period, elapsed, floor)) => {}
            }
        }

        info!("convergence loop stopped");
    }
}

/// Re-reads bridge membership on its own timer.
pub async fn refresh_bridges(bridges: Arc<BridgeLoad>, period: Duration, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(period) => bridges.refresh().await,
        }
    }
}

/// Re-reads host addresses and default routes on its own timer.
pub async fn refresh_addresses(cache: Arc<AddressCache>, period: Duration, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(period) => {
                if let Err(e) = cache.refresh().await {
                    warn!("failed to refresh address cache: {}", e);
                }
            }
        }
    }
}
