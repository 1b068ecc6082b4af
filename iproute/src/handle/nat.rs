use std::ops::Deref;

use crate::{
    core::tolerate,
    error::Result,
    iproute::{IpRoute, IPTABLES},
    route::nat::{HostNatRule, NAT_TABLE, POSTROUTING},
};

pub struct NatHandle<'a> {
    pub iproute: &'a IpRoute,
}

impl<'a> Deref for NatHandle<'a> {
    type Target = IpRoute;

    fn deref(&self) -> &Self::Target {
        self.iproute
    }
}

impl<'a> From<&'a IpRoute> for NatHandle<'a> {
    fn from(iproute: &'a IpRoute) -> Self {
        Self { iproute }
    }
}

fn nat_args(op: &str, rest: Vec<String>) -> Vec<String> {
    let mut args = vec![
        "-t".to_owned(),
        NAT_TABLE.to_owned(),
        op.to_owned(),
        POSTROUTING.to_owned(),
    ];
    args.extend(rest);
    args
}

impl NatHandle<'_> {
    /// Masquerade rules in `POSTROUTING` tagged with `comment`, in table order.
    pub async fn list(&self, comment: &str) -> Result<Vec<HostNatRule>> {
        let output = self.query(IPTABLES, &nat_args("-S", Vec::new())).await?;

        Ok(output
            .lines()
            .filter_map(|line| HostNatRule::from_save_line(line, comment))
            .collect())
    }

    pub async fn add(&self, rule: &HostNatRule, comment: &str) -> Result<()> {
        self.exec(&[], IPTABLES, &nat_args("-A", rule.spec(comment)))
            .await?;
        Ok(())
    }

    pub async fn del(&self, rule: &HostNatRule, comment: &str) -> Result<()> {
        self.exec(
            tolerate::NAT_DEL,
            IPTABLES,
            &nat_args("-D", rule.spec(comment)),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{route::nat::HostNatRule, testing::FakeExecutor};

    const COMMENT: &str = "hvnet_host_nat";

    #[tokio::test]
    async fn test_list_tagged_rules() {
        let (exec, iproute) = FakeExecutor::iproute();
        exec.respond_ok(
            "iptables -t nat -S POSTROUTING",
            "-P POSTROUTING ACCEPT\n\
             -A POSTROUTING -s 172.17.0.0/16 ! -o docker0 -j MASQUERADE\n\
             -A POSTROUTING -s 198.18.84.0/22 -o eth0 -m comment --comment hvnet_host_nat -j MASQUERADE\n",
        );

        let rules = iproute.handle_nat().list(COMMENT).await.unwrap();
        assert_eq!(rules, vec![HostNatRule::new("198.18.84.0/22", "eth0")]);
    }

    #[tokio::test]
    async fn test_add_and_del() {
        let (exec, iproute) = FakeExecutor::iproute();
        let rule = HostNatRule::new("198.18.84.0/22", "eth0");
        exec.respond_err(
            "iptables -t nat -D POSTROUTING -s 198.18.84.0/22 -o eth0 -m comment --comment hvnet_host_nat -j MASQUERADE",
            "iptables: Bad rule (does a matching rule exist in that chain?).",
        );

        iproute.handle_nat().add(&rule, COMMENT).await.unwrap();
        iproute.handle_nat().del(&rule, COMMENT).await.unwrap();

        assert_eq!(
            exec.calls(),
            vec![
                "iptables -t nat -A POSTROUTING -s 198.18.84.0/22 -o eth0 -m comment --comment hvnet_host_nat -j MASQUERADE",
                "iptables -t nat -D POSTROUTING -s 198.18.84.0/22 -o eth0 -m comment --comment hvnet_host_nat -j MASQUERADE",
            ]
        );
    }
}
