use std::ops::Deref;

use crate::{
    core::tolerate,
    error::Result,
    iproute::{ip_args, IpRoute, IP},
    route::{link::Link, parse_list},
};

pub struct LinkHandle<'a> {
    pub iproute: &'a IpRoute,
}

impl<'a> Deref for LinkHandle<'a> {
    type Target = IpRoute;

    fn deref(&self) -> &Self::Target {
        self.iproute
    }
}

impl<'a> From<&'a IpRoute> for LinkHandle<'a> {
    fn from(iproute: &'a IpRoute) -> Self {
        Self { iproute }
    }
}

impl LinkHandle<'_> {
    async fn list_args(&self, args: Vec<String>) -> Result<Vec<Link>> {
        let output = self.query(IP, &args).await?;
        parse_list(&format!("{} {}", IP, args.join(" ")), &output)
    }

    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<Link>> {
        self.list_args(ip_args(namespace, &["--json", "link", "show"]))
            .await
    }

    /// Interfaces enslaved to `bridge` in the host namespace.
    pub async fn list_master(&self, bridge: &str) -> Result<Vec<Link>> {
        self.list_args(ip_args(None, &["--json", "link", "show", "master", bridge]))
            .await
    }

    pub async fn bridge_add(&self, name: &str) -> Result<()> {
        let args = ip_args(None, &["link", "add", "name", name, "type", "bridge"]);
        self.exec(tolerate::LINK_ADD, IP, &args).await?;
        Ok(())
    }

    pub async fn up(&self, name: &str) -> Result<()> {
        let args = ip_args(None, &["link", "set", "dev", name, "up"]);
        self.exec(&[], IP, &args).await?;
        Ok(())
    }

    pub async fn set_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        let mtu = mtu.to_string();
        let args = ip_args(None, &["link", "set", "dev", name, "mtu", mtu.as_str()]);
        self.exec(&[], IP, &args).await?;
        Ok(())
    }
}
