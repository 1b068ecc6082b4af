use std::ops::Deref;

use crate::{
    error::Result,
    iproute::{ip_args, IpRoute, IP},
    route::{parse_list, Netns},
};

pub struct NetnsHandle<'a> {
    pub iproute: &'a IpRoute,
}

impl<'a> Deref for NetnsHandle<'a> {
    type Target = IpRoute;

    fn deref(&self) -> &Self::Target {
        self.iproute
    }
}

impl<'a> From<&'a IpRoute> for NetnsHandle<'a> {
    fn from(iproute: &'a IpRoute) -> Self {
        Self { iproute }
    }
}

impl NetnsHandle<'_> {
    pub async fn list(&self) -> Result<Vec<Netns>> {
        let args = ip_args(None, &["--json", "netns", "list"]);
        let output = self.query(IP, &args).await?;

        parse_list(&format!("{} {}", IP, args.join(" ")), &output)
    }
}
