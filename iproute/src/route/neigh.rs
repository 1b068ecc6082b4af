use std::net::IpAddr;

use derive_builder::Builder;
use serde::Deserialize;

use crate::parse_mac;

/// One entry of `ip --json neighbor`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NeighEntry {
    pub dst: String,
    #[serde(default)]
    pub dev: String,
    #[serde(default)]
    pub lladdr: Option<String>,
    #[serde(default)]
    pub state: Vec<String>,
    #[serde(default)]
    pub router: Option<serde_json::Value>,
}

impl NeighEntry {
    pub fn is_permanent(&self) -> bool {
        self.state.iter().any(|s| s == "PERMANENT")
    }
}

/// A neighbor to install or remove.
#[derive(Debug, Clone, Default, Builder, PartialEq, Eq)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct Neighbor {
    #[builder(setter(into))]
    pub dev: String,
    pub ip_addr: Option<IpAddr>,
    #[builder(setter(into, strip_option))]
    pub mac_addr: Option<String>,
    pub permanent: bool,
}

impl Neighbor {
    fn ip(&self) -> String {
        self.ip_addr.map(|ip| ip.to_string()).unwrap_or_default()
    }

    pub fn replace_args(&self) -> Vec<String> {
        let mut args = vec!["neighbor".to_owned(), "replace".to_owned(), self.ip()];

        if let Some(mac) = &self.mac_addr {
            args.push("lladdr".to_owned());
            args.push(mac.to_lowercase());
        }

        args.push("dev".to_owned());
        args.push(self.dev.clone());

        if self.permanent {
            args.push("nud".to_owned());
            args.push("permanent".to_owned());
        }

        args
    }

    pub fn del_args(&self) -> Vec<String> {
        vec![
            "neighbor".to_owned(),
            "del".to_owned(),
            self.ip(),
            "dev".to_owned(),
            self.dev.clone(),
        ]
    }
}

impl NeighborBuilder {
    fn validate(&self) -> Result<(), String> {
        if matches!(self.ip_addr, None | Some(None)) {
            return Err("IP address is required".to_string());
        }

        if self.dev.as_deref().map_or(true, str::is_empty) {
            return Err("device is required".to_string());
        }

        if let Some(Some(mac)) = &self.mac_addr {
            parse_mac(mac).map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::route::parse_list;

    use super::*;

    #[test]
    fn test_neighbor_builder_default_returns_error() {
        let neighbor = NeighborBuilder::default().build();
        assert!(neighbor.is_err());
    }

    #[test]
    fn test_neighbor_builder_rejects_bad_mac() {
        let neighbor = NeighborBuilder::default()
            .dev("br0")
            .ip_addr(Some("10.0.0.5".parse().unwrap()))
            .mac_addr("aa:bb:cc")
            .build();
        assert!(neighbor.is_err());
    }

    #[test]
    fn test_neighbor_replace_args() {
        let neighbor = NeighborBuilder::default()
            .dev("br0")
            .ip_addr(Some("10.0.0.5".parse().unwrap()))
            .mac_addr("AA:BB:CC:DD:EE:01")
            .permanent(true)
            .build()
            .unwrap();

        assert_eq!(
            neighbor.replace_args().join(" "),
            "neighbor replace 10.0.0.5 lladdr aa:bb:cc:dd:ee:01 dev br0 nud permanent"
        );
        assert_eq!(neighbor.del_args().join(" "), "neighbor del 10.0.0.5 dev br0");
    }

    #[test]
    fn test_parse_neighbor_table() {
        let output = r#"[
            {"dst":"10.0.0.5","dev":"br0","lladdr":"aa:bb:cc:dd:ee:01","state":["PERMANENT"]},
            {"dst":"10.0.0.9","dev":"br0","lladdr":"aa:bb:cc:dd:ee:09","state":["STALE"]},
            {"dst":"10.0.0.1","dev":"br0","state":["FAILED"]},
            {"dst":"fe80::1","dev":"br0","lladdr":"aa:bb:cc:dd:ee:02","router":null,"state":["REACHABLE"]}
        ]"#;
        let entries: Vec<NeighEntry> = parse_list("ip --json neighbor", output).unwrap();

        assert_eq!(entries.len(), 4);
        assert!(entries[0].is_permanent());
        assert!(!entries[1].is_permanent());
        assert_eq!(entries[2].lladdr, None);
    }
}
