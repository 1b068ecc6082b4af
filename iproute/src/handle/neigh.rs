use std::ops::Deref;

use crate::{
    core::tolerate,
    error::Result,
    iproute::{ip_args, IpRoute, IP},
    route::{
        neigh::{NeighEntry, Neighbor},
        parse_list,
    },
};

pub struct NeighHandle<'a> {
    pub iproute: &'a IpRoute,
}

impl<'a> Deref for NeighHandle<'a> {
    type Target = IpRoute;

    fn deref(&self) -> &Self::Target {
        self.iproute
    }
}

impl<'a> From<&'a IpRoute> for NeighHandle<'a> {
    fn from(iproute: &'a IpRoute) -> Self {
        Self { iproute }
    }
}

impl NeighHandle<'_> {
    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<NeighEntry>> {
        let args = ip_args(namespace, &["--json", "neighbor"]);
        let output = self.query(IP, &args).await?;

        parse_list(&format!("{} {}", IP, args.join(" ")), &output)
    }

    /// Installs or overwrites the entry for the neighbor's IP.
    pub async fn replace(&self, namespace: Option<&str>, neigh: &Neighbor) -> Result<()> {
        let args = ip_args(namespace, &neigh.replace_args());
        self.exec(tolerate::NEIGH_REPLACE, IP, &args).await?;
        Ok(())
    }

    pub async fn del(&self, namespace: Option<&str>, neigh: &Neighbor) -> Result<()> {
        let args = ip_args(namespace, &neigh.del_args());
        self.exec(tolerate::NEIGH_DEL, IP, &args).await?;
        Ok(())
    }
}
