//! Prometheus instrumentation for the outbox processor.
//!
//! Backlog gauges (pending count, oldest pending age) let dashboards alert on
//! a stalled worker before feeds drift; the published counter tracks
//! dispatch throughput.

use prometheus::core::Collector;
use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

/// Metrics for one service's outbox, registered on the default registry so
/// the service's `/metrics` endpoint picks them up without extra wiring.
#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub published: IntCounter,
}

impl OutboxMetrics {
    pub fn new(service: &str) -> Self {
        let pending = IntGauge::with_opts(
            Opts::new(
                "outbox_pending_count",
                "Unpublished outbox events awaiting dispatch",
            )
            .const_label("service", service),
        )
        .expect("outbox_pending_count opts are valid");

        let oldest_pending_age_seconds = IntGauge::with_opts(
            Opts::new(
                "outbox_oldest_pending_age_seconds",
                "Seconds since the oldest pending outbox event was created",
            )
            .const_label("service", service),
        )
        .expect("outbox_oldest_pending_age_seconds opts are valid");

        let published = IntCounter::with_opts(
            Opts::new(
                "outbox_published_total",
                "Outbox events successfully dispatched and acked",
            )
            .const_label("service", service),
        )
        .expect("outbox_published_total opts are valid");

        let metrics = Self {
            pending,
            oldest_pending_age_seconds,
            published,
        };
        metrics.register();
        metrics
    }

    // Duplicate registration happens when two processors share a process;
    // the collision is logged and the later instance keeps its local handles.
    fn register(&self) {
        let registry = prometheus::default_registry();
        let collectors: [Box<dyn Collector>; 3] = [
            Box::new(self.pending.clone()),
            Box::new(self.oldest_pending_age_seconds.clone()),
            Box::new(self.published.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                warn!(error = %e, "outbox metric registration failed");
            }
        }
    }
}
