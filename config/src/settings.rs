use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

/// Agent settings. Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bridge inside instance namespaces whose neighbor table is managed.
    pub bridge_iface_name: String,
    /// Host-side bridge carrying the host network gateway.
    pub host_network_name: String,
    /// Bridge used when a node declares none.
    pub default_bridge_name: String,
    pub normal_mtu: u32,
    pub jumbo_mtu: u32,
    pub vxlan_overhead: u32,

    pub cycle_period_ms: u64,
    pub cycle_floor_ms: u64,
    pub slow_cycle_ms: u64,
    pub command_timeout_secs: u64,
    pub bridge_sync_ttl_secs: u64,
    pub address_refresh_ttl_secs: u64,

    /// Comment marker identifying NAT rules owned by the agent.
    pub nat_comment: String,

    pub state_path: String,
    pub listen_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bridge_iface_name: "br0".into(),
            host_network_name: "hvnethost0".into(),
            default_bridge_name: "br0".into(),
            normal_mtu: 1500,
            jumbo_mtu: 9000,
            vxlan_overhead: 50,
            cycle_period_ms: 3000,
            cycle_floor_ms: 500,
            slow_cycle_ms: 3000,
            command_timeout_secs: 15,
            bridge_sync_ttl_secs: 15,
            address_refresh_ttl_secs: 1800,
            nat_comment: "hvnet_host_nat".into(),
            state_path: "/etc/hvnet/state.yaml".into(),
            listen_addr: "0.0.0.0:9680".into(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "json")
}

impl Settings {
    /// Reads settings from a YAML file, or JSON when the extension is `.json`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;

        let settings = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        Ok(settings)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| anyhow::anyhow!(e))
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn cycle_floor(&self) -> Duration {
        Duration::from_millis(self.cycle_floor_ms)
    }

    pub fn slow_cycle(&self) -> Duration {
        Duration::from_millis(self.slow_cycle_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn bridge_sync_ttl(&self) -> Duration {
        Duration::from_secs(self.bridge_sync_ttl_secs)
    }

    pub fn address_refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.address_refresh_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: Settings = serde_yaml::from_str("jumbo_mtu: 8950\nnat_comment: custom\n").unwrap();

        assert_eq!(settings.jumbo_mtu, 8950);
        assert_eq!(settings.nat_comment, "custom");
        assert_eq!(settings.normal_mtu, 1500);
        assert_eq!(settings.cycle_period(), Duration::from_secs(3));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            listen_addr: "127.0.0.1:9999".into(),
            ..Default::default()
        };

        let yaml = dir.path().join("nested/agent.yaml");
        settings.write(&yaml).unwrap();
        assert_eq!(Settings::load(&yaml).unwrap(), settings);

        let json = dir.path().join("agent.json");
        settings.write(&json).unwrap();
        assert!(std::fs::read_to_string(&json).unwrap().contains("\"listen_addr\""));
        assert_eq!(Settings::load(&json).unwrap(), settings);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Settings::load("/nonexistent/hvnet/agent.yaml").is_err());
    }
}
