//! Observability seam for the pipeline.
//!
//! The proxy only owns the counter increments; the exporter behind them is a
//! deployment concern. The default recorder feeds the counters into the
//! tracing stream.

pub trait MetricsRecorder: Send + Sync {
    /// A caller was authenticated under the given scheme and provider key.
    fn inc_authenticated(&self, kind: &str, provider: &str);

    /// A caller was authorized by the given evaluator for the provider key.
    fn inc_authorized(&self, kind: &str, provider: &str);
}

/// Counter recorder that emits tracing events instead of real metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsRecorder for TracingMetrics {
    fn inc_authenticated(&self, kind: &str, provider: &str) {
        tracing::debug!(counter = "authenticated_total", kind = %kind, provider = %provider, "increment");
    }

    fn inc_authorized(&self, kind: &str, provider: &str) {
        tracing::debug!(counter = "authorized_total", kind = %kind, provider = %provider, "increment");
    }
}
