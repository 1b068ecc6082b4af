use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use hvnet_iproute::{
    route::{addr::Iface, routing::default_dev, routing::Route},
    IpRoute,
};
use tracing::{debug, warn};

#[derive(Default)]
struct Cached {
    ifaces: Vec<Iface>,
    routes: Vec<Route>,
    refreshed: Option<Instant>,
}

/// Host addresses and default routes, re-read at most once per TTL.
///
/// Only used for advisory lookups such as picking the NAT egress device.
pub struct AddressCache {
    iproute: IpRoute,
    ttl: Duration,
    cached: Mutex<Cached>,
}

impl AddressCache {
    pub fn new(iproute: IpRoute, ttl: Duration) -> Self {
        Self {
            iproute,
            ttl,
            cached: Mutex::new(Cached::default()),
        }
    }

    fn is_fresh(&self) -> bool {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        cached
            .refreshed
            .map_or(false, |at| at.elapsed() < self.ttl)
    }

    pub async fn refresh(&self) -> crate::Result<()> {
        let ifaces = self.iproute.handle_addr().list(None).await?;
        let routes = self.iproute.handle_route().default_routes().await?;
        debug!(
            "address cache refreshed: {} interfaces, {} default routes",
            ifaces.len(),
            routes.len()
        );

        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        *cached = Cached {
            ifaces,
            routes,
            refreshed: Some(Instant::now()),
        };

        Ok(())
    }

    async fn ensure_fresh(&self) {
        if self.is_fresh() {
            return;
        }

        if let Err(e) = self.refresh().await {
            warn!("failed to refresh address cache: {}", e);
        }
    }

    /// Device of the lowest metric default route, if that device exists.
    pub async fn default_interface(&self) -> Option<String> {
        self.ensure_fresh().await;

        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        let dev = default_dev(&cached.routes)?;

        cached
            .ifaces
            .iter()
            .any(|iface| iface.ifname == dev)
            .then(|| dev.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use hvnet_iproute::testing::FakeExecutor;

    use super::*;

    const ADDRS: &str = r#"[
        {"ifindex":1,"ifname":"lo","addr_info":[{"family":"inet","local":"127.0.0.1","prefixlen":8,"scope":"host"}]},
        {"ifindex":2,"ifname":"eth0","addr_info":[{"family":"inet","local":"10.1.0.4","prefixlen":24,"scope":"global"}]}
    ]"#;

    #[tokio::test]
    async fn test_default_interface_is_cached() {
        let (exec, iproute) = FakeExecutor::iproute();
        exec.respond_ok("ip --json address", ADDRS);
        exec.respond_ok(
            "ip --json route show default",
            r#"[{"dst":"default","gateway":"10.1.0.1","dev":"eth0","flags":[]}]"#,
        );
        let cache = AddressCache::new(iproute, Duration::from_secs(60));

        assert_eq!(cache.default_interface().await.as_deref(), Some("eth0"));
        assert_eq!(cache.default_interface().await.as_deref(), Some("eth0"));
        assert_eq!(exec.calls().len(), 2);

        cache.refresh().await.unwrap();
        assert_eq!(exec.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_default_interface_requires_device() {
        let (exec, iproute) = FakeExecutor::iproute();
        exec.respond_ok("ip --json address", ADDRS);
        exec.respond_ok(
            "ip --json route show default",
            r#"[{"dst":"default","dev":"wg0","flags":[]}]"#,
        );
        let cache = AddressCache::new(iproute, Duration::from_secs(60));

        assert_eq!(cache.default_interface().await, None);
    }

    #[tokio::test]
    async fn test_failed_refresh_returns_none() {
        let (exec, iproute) = FakeExecutor::iproute();
        exec.respond_err("ip --json address", "Cannot open netlink socket");
        let cache = AddressCache::new(iproute, Duration::from_secs(60));

        assert_eq!(cache.default_interface().await, None);
    }
}
