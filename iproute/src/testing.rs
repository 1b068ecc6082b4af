//! Scripted executor for tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    core::exec::{command_line, Executor, RawOutput},
    error::Result,
    iproute::IpRoute,
};

/// Records every command line and answers from a table keyed by the full
/// command line. Unknown commands succeed with empty output.
#[derive(Default)]
pub struct FakeExecutor {
    responses: Mutex<HashMap<String, RawOutput>>,
    calls: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for an `IpRoute` over a fresh fake.
    pub fn iproute() -> (Arc<FakeExecutor>, IpRoute) {
        let exec = Arc::new(FakeExecutor::new());
        let iproute = IpRoute::new(exec.clone());
        (exec, iproute)
    }

    pub fn respond(&self, line: &str, output: RawOutput) {
        self.responses
            .lock()
            .unwrap()
            .insert(line.to_owned(), output);
    }

    pub fn respond_ok(&self, line: &str, stdout: &str) {
        self.respond(line, RawOutput::ok(stdout));
    }

    pub fn respond_err(&self, line: &str, stderr: &str) {
        self.respond(line, RawOutput::failed(stderr));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Calls that are not `--json` listings or `iptables -S` dumps.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.contains("--json") && !c.contains(" -S "))
            .collect()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run(&self, name: &str, args: &[String]) -> Result<RawOutput> {
        let line = command_line(name, args);
        self.calls.lock().unwrap().push(line.clone());

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&line)
            .cloned()
            .unwrap_or_else(|| RawOutput::ok("")))
    }
}
