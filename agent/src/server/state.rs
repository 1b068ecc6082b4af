use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use prometheus::Registry;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{metrics::Metrics, runner::Context};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Unknown,
    Hypervisor,
    Node,
}

/// Diagnostics to be exposed by the web server
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub last_cycle: Option<DateTime<Utc>>,
    pub last_elapsed_ms: u64,
    pub cycles: u64,
    pub role: Role,
    /// Last error per phase, cleared when the phase succeeds again.
    pub last_errors: BTreeMap<String, String>,
}

/// State shared between the convergence loop and the web server
#[derive(Clone, Default)]
pub struct AppState {
    diagnostics: Arc<RwLock<Diagnostics>>,
    registry: Registry,
}

impl AppState {
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    /// Registers loop metrics and hands out a context that updates this state.
    pub fn to_context(&self) -> Result<Context, prometheus::Error> {
        Ok(Context {
            metrics: Metrics::new()?.register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        })
    }
}
