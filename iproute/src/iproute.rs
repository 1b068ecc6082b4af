use std::sync::Arc;

use tracing::{debug, error};

use crate::{
    core::exec::{command_line, Executor},
    error::{Error, Result},
    handle::{
        addr::AddrHandle, link::LinkHandle, nat::NatHandle, neigh::NeighHandle,
        netns::NetnsHandle, routing::RouteHandle,
    },
};

pub const IP: &str = "ip";
pub const IPTABLES: &str = "iptables";

/// Entry point for every `ip`/`iptables` invocation made by the agent.
#[derive(Clone)]
pub struct IpRoute {
    executor: Arc<dyn Executor>,
}

impl IpRoute {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Runs a mutating command.
    ///
    /// A failure whose output contains one of `tolerate` is reported as
    /// success with empty output. Spawn failures and timeouts never are.
    pub async fn exec(&self, tolerate: &[&str], name: &str, args: &[String]) -> Result<String> {
        let cmd = command_line(name, args);
        debug!("running command: {}", cmd);

        let out = self.executor.run(name, args).await?;
        if out.success {
            return Ok(out.combined());
        }

        if out.tolerated(tolerate) {
            debug!("tolerated failure of '{}': {}", cmd, out.combined().trim());
            return Ok(String::new());
        }

        let output = out.combined().trim().to_owned();
        error!(cmd = %cmd, output = %output, "process exec error");

        Err(Error::Exec { cmd, output })
    }

    /// Runs a read-only query and returns its stdout.
    pub async fn query(&self, name: &str, args: &[String]) -> Result<String> {
        let cmd = command_line(name, args);
        debug!("running query: {}", cmd);

        let out = self.executor.run(name, args).await?;
        if !out.success {
            return Err(Error::Exec {
                cmd,
                output: out.combined().trim().to_owned(),
            });
        }

        Ok(out.stdout)
    }

    pub fn handle_link(&self) -> LinkHandle {
        LinkHandle::from(self)
    }

    pub fn handle_addr(&self) -> AddrHandle {
        AddrHandle::from(self)
    }

    pub fn handle_neigh(&self) -> NeighHandle {
        NeighHandle::from(self)
    }

    pub fn handle_netns(&self) -> NetnsHandle {
        NetnsHandle::from(self)
    }

    pub fn handle_route(&self) -> RouteHandle {
        RouteHandle::from(self)
    }

    pub fn handle_nat(&self) -> NatHandle {
        NatHandle::from(self)
    }
}

/// Builds `ip <args>`, or `ip netns exec <ns> ip <args>` when namespaced.
pub fn ip_args<S: AsRef<str>>(namespace: Option<&str>, args: &[S]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len() + 4);

    if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
        out.push("netns".to_owned());
        out.push("exec".to_owned());
        out.push(ns.to_owned());
        out.push(IP.to_owned());
    }

    out.extend(args.iter().map(|a| a.as_ref().to_owned()));
    out
}
