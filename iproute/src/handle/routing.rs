use std::ops::Deref;

use crate::{
    error::Result,
    iproute::{ip_args, IpRoute, IP},
    route::{parse_list, routing::Route},
};

pub struct RouteHandle<'a> {
    pub iproute: &'a IpRoute,
}

impl<'a> Deref for RouteHandle<'a> {
    type Target = IpRoute;

    fn deref(&self) -> &Self::Target {
        self.iproute
    }
}

impl<'a> From<&'a IpRoute> for RouteHandle<'a> {
    fn from(iproute: &'a IpRoute) -> Self {
        Self { iproute }
    }
}

impl RouteHandle<'_> {
    pub async fn default_routes(&self) -> Result<Vec<Route>> {
        let args = ip_args(None, &["--json", "route", "show", "default"]);
        let output = self.query(IP, &args).await?;

        parse_list(&format!("{} {}", IP, args.join(" ")), &output)
    }
}
