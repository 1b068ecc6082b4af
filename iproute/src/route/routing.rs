use serde::Deserialize;

/// One entry of `ip --json route show`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub dst: String,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub dev: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub metric: Option<u32>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Route {
    pub fn is_default(&self) -> bool {
        self.dst == "default"
    }
}

/// Device of the preferred default route: lowest metric, first listed on ties.
pub fn default_dev(routes: &[Route]) -> Option<&str> {
    routes
        .iter()
        .filter(|r| r.is_default() && r.dev.is_some())
        .min_by_key(|r| r.metric.unwrap_or(0))
        .and_then(|r| r.dev.as_deref())
}

#[cfg(test)]
mod tests {
    use crate::route::parse_list;

    use super::*;

    #[test]
    fn test_default_dev() {
        let output = r#"[
            {"dst":"default","gateway":"10.1.0.1","dev":"eth1","protocol":"dhcp","metric":200,"flags":[]},
            {"dst":"default","gateway":"10.0.0.1","dev":"eth0","protocol":"dhcp","metric":100,"flags":[]}
        ]"#;
        let routes: Vec<Route> = parse_list("ip --json route show default", output).unwrap();

        assert_eq!(default_dev(&routes), Some("eth0"));
    }

    #[test]
    fn test_default_dev_none() {
        assert_eq!(default_dev(&[]), None);
    }
}
