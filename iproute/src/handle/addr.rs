use std::ops::Deref;

use crate::{
    core::tolerate,
    error::Result,
    iproute::{ip_args, IpRoute, IP},
    route::{addr::Iface, parse_list},
};

pub struct AddrHandle<'a> {
    pub iproute: &'a IpRoute,
}

impl<'a> Deref for AddrHandle<'a> {
    type Target = IpRoute;

    fn deref(&self) -> &Self::Target {
        self.iproute
    }
}

impl<'a> From<&'a IpRoute> for AddrHandle<'a> {
    fn from(iproute: &'a IpRoute) -> Self {
        Self { iproute }
    }
}

impl AddrHandle<'_> {
    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<Iface>> {
        let args = ip_args(namespace, &["--json", "address"]);
        let output = self.query(IP, &args).await?;

        parse_list(&format!("{} {}", IP, args.join(" ")), &output)
    }

    /// Addresses of one host device, `None` when the device does not exist.
    pub async fn show(&self, dev: &str) -> Result<Option<Iface>> {
        let args = ip_args(None, &["--json", "address", "show", "dev", dev]);
        let output = self.exec(tolerate::ADDR_MISSING_DEV, IP, &args).await?;

        let ifaces: Vec<Iface> = parse_list(&format!("{} {}", IP, args.join(" ")), &output)?;
        Ok(ifaces.into_iter().find(|iface| iface.ifname == dev))
    }

    pub async fn flush(&self, dev: &str) -> Result<()> {
        let args = ip_args(None, &["addr", "flush", "dev", dev]);
        self.exec(tolerate::ADDR_MISSING_DEV, IP, &args).await?;
        Ok(())
    }

    pub async fn add(&self, cidr: &str, dev: &str) -> Result<()> {
        let args = ip_args(None, &["addr", "add", cidr, "dev", dev]);
        self.exec(tolerate::ADDR_ADD, IP, &args).await?;
        Ok(())
    }
}
