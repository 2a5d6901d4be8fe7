//! Prometheus metrics surface (spec §4.12).

use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_int_gauge_with_registry, Counter, CounterVec,
    Encoder, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};

const LATENCY_BUCKETS_MS: &[f64] = &[1.0, 2.5, 5.0, 7.5, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

pub struct Metrics {
    pub registry: Registry,

    pub ingress_total: CounterVec,
    pub latency_seconds: HistogramVec,
    pub downstream_success_total: CounterVec,
    pub downstream_fail_total: CounterVec,
    pub dlq_total: CounterVec,
    pub replay_runs_total: CounterVec,
    pub replay_items_total: CounterVec,
    pub replay_rate_limited_total: Counter,
    pub rejected_total: CounterVec,
    pub dlq_backlog: IntGauge,

    pub retry_attempts_total: CounterVec,
    pub retry_success_total: CounterVec,
    pub retry_failure_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ingress_total = register_counter_vec_with_registry!(
            Opts::new("router_ingress_total", "Distinct signals admitted through /route"),
            &["type"],
            registry
        )?;

        // Buckets are expressed in milliseconds in the spec table; the
        // histogram itself observes seconds (Prometheus convention), so we
        // convert at registration time.
        let latency_buckets: Vec<f64> = LATENCY_BUCKETS_MS.iter().map(|ms| ms / 1000.0).collect();
        let latency_seconds = register_histogram_vec_with_registry!(
            prometheus::HistogramOpts::new("router_latency_seconds", "Operation latency in seconds")
                .buckets(latency_buckets),
            &["operation", "kind"],
            registry
        )?;

        let downstream_success_total = register_counter_vec_with_registry!(
            Opts::new("router_downstream_success_total", "Successful agent calls"),
            &["service"],
            registry
        )?;

        let downstream_fail_total = register_counter_vec_with_registry!(
            Opts::new("router_downstream_fail_total", "Failed agent calls"),
            &["service", "reason"],
            registry
        )?;

        let dlq_total = register_counter_vec_with_registry!(
            Opts::new("router_dlq_total", "Events written to the dead-letter queue"),
            &["reason"],
            registry
        )?;

        let replay_runs_total = register_counter_vec_with_registry!(
            Opts::new("router_replay_runs_total", "Replay scheduler ticks"),
            &["mode"],
            registry
        )?;

        let replay_items_total = register_counter_vec_with_registry!(
            Opts::new("router_replay_items_total", "DLQ items processed by replay"),
            &["mode", "outcome"],
            registry
        )?;

        let replay_rate_limited_total = register_counter_with_registry!(
            Opts::new("router_replay_rate_limited_total", "Replay ticks skipped for rate limiting"),
            registry
        )?;

        let rejected_total = register_counter_vec_with_registry!(
            Opts::new("router_rejected_total", "Requests rejected before routing"),
            &["reason"],
            registry
        )?;

        let dlq_backlog = register_int_gauge_with_registry!(
            Opts::new("dlq_backlog", "Current number of rows in the dlq table"),
            registry
        )?;

        let retry_attempts_total = register_counter_vec_with_registry!(
            Opts::new("router_retry_attempts_total", "Retry attempts per agent"),
            &["agent"],
            registry
        )?;
        let retry_success_total = register_counter_vec_with_registry!(
            Opts::new("router_retry_success_total", "Retry successes per agent"),
            &["agent"],
            registry
        )?;
        let retry_failure_total = register_counter_vec_with_registry!(
            Opts::new("router_retry_failure_total", "Retry failures per agent"),
            &["agent"],
            registry
        )?;

        Ok(Self {
            registry,
            ingress_total,
            latency_seconds,
            downstream_success_total,
            downstream_fail_total,
            dlq_total,
            replay_runs_total,
            replay_items_total,
            replay_rate_limited_total,
            rejected_total,
            dlq_backlog,
            retry_attempts_total,
            retry_success_total,
            retry_failure_total,
        })
    }

    /// Export in Prometheus text exposition format.
    pub fn export(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_prometheus_text() {
        let metrics = Metrics::new().unwrap();
        metrics.ingress_total.with_label_values(&["assist"]).inc();
        let text = metrics.export().unwrap();
        assert!(text.contains("router_ingress_total"));
    }
}
