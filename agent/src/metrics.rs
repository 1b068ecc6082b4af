use prometheus::{histogram_opts, opts, Histogram, IntCounter, IntCounterVec, Registry};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub cycles: IntCounter,
    pub cycle_duration: Histogram,
    pub slow_cycles: IntCounter,
    pub failures: IntCounterVec,
    pub changes: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let cycle_duration = Histogram::with_opts(
            histogram_opts!(
                "hvnet_cycle_duration_seconds",
                "The duration of one convergence cycle in seconds"
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1., 3., 10., 30.]),
        )?;

        Ok(Self {
            cycles: IntCounter::with_opts(opts!("hvnet_cycles_total", "convergence cycles"))?,
            cycle_duration,
            slow_cycles: IntCounter::with_opts(opts!(
                "hvnet_slow_cycles_total",
                "cycles slower than the slow cycle threshold"
            ))?,
            failures: IntCounterVec::new(
                opts!("hvnet_phase_failures_total", "failed cycle phases"),
                &["phase", "error"],
            )?,
            changes: IntCounterVec::new(
                opts!("hvnet_changes_total", "passes that changed kernel state"),
                &["reconciler"],
            )?,
        })
    }

    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.cycles.clone()))?;
        registry.register(Box::new(self.cycle_duration.clone()))?;
        registry.register(Box::new(self.slow_cycles.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.changes.clone()))?;
        Ok(self)
    }

    pub fn phase_failure(&self, phase: &str, error: &crate::Error) {
        self.failures
            .with_label_values(&[phase, error.metric_label()])
            .inc()
    }

    pub fn changed(&self, reconciler: &str) {
        self.changes.with_label_values(&[reconciler]).inc()
    }

    pub fn slow_cycle(&self) {
        self.slow_cycles.inc()
    }

    /// Counts a cycle and observes its duration when the returned value drops.
    pub fn count_and_measure(&self) -> CycleMeasurer {
        self.cycles.inc();
        CycleMeasurer {
            start: Instant::now(),
            metric: self.cycle_duration.clone(),
        }
    }
}

pub struct CycleMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for CycleMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}
