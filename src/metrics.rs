// Pipeline Prometheus metrics
//
// Process-global counters and histograms for the transformation pipeline:
// - Store lookups by outcome (hit, miss, on_demand)
// - Pipeline runs by stack and outcome, plus their duration
// - Encode fallbacks (animated WebP -> GIF)
// - Invalidated derivatives

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramTimer,
    HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;

/// Global metrics registry for the transformation pipeline
pub struct PipelineMetrics {
    /// Derivative already stored
    pub store_hits: IntCounter,

    /// Derivative had to be computed
    pub store_misses: IntCounter,

    /// URL handed out without computing (on-demand store)
    pub store_on_demand: IntCounter,

    /// Pipeline runs by stack and outcome (success, error)
    pub pipeline_runs: IntCounterVec,

    /// Pipeline duration histogram (in seconds) by stack
    pub pipeline_duration: HistogramVec,

    /// Encode retries with a fallback format, by from/to format
    pub encode_fallbacks: IntCounterVec,

    /// Derivatives removed by invalidation
    pub invalidations: IntCounter,
}

/// Global singleton instance of metrics
static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

impl PipelineMetrics {
    /// Initialize and return the global metrics instance
    ///
    /// Subsequent calls return the same instance.
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let store_lookups = register_int_counter_vec!(
                "imagestack_store_lookups_total",
                "Derivative lookups by outcome",
                &["outcome"] // hit, miss, on_demand
            )
            .expect("Failed to register store_lookups_total metric");

            let pipeline_runs = register_int_counter_vec!(
                "imagestack_pipeline_runs_total",
                "Stack executions by stack and outcome",
                &["stack", "outcome"]
            )
            .expect("Failed to register pipeline_runs_total metric");

            let pipeline_duration = register_histogram_vec!(
                "imagestack_pipeline_duration_seconds",
                "Duration of stack executions in seconds",
                &["stack"],
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
            )
            .expect("Failed to register pipeline_duration_seconds metric");

            let encode_fallbacks = register_int_counter_vec!(
                "imagestack_encode_fallbacks_total",
                "Encodes retried with a fallback format",
                &["from", "to"]
            )
            .expect("Failed to register encode_fallbacks_total metric");

            let invalidations = register_int_counter!(
                "imagestack_invalidations_total",
                "Derivatives removed by cache invalidation"
            )
            .expect("Failed to register invalidations_total metric");

            PipelineMetrics {
                store_hits: store_lookups.with_label_values(&["hit"]),
                store_misses: store_lookups.with_label_values(&["miss"]),
                store_on_demand: store_lookups.with_label_values(&["on_demand"]),
                pipeline_runs,
                pipeline_duration,
                encode_fallbacks,
                invalidations,
            }
        })
    }

    /// Start timing one stack execution; observed when dropped
    pub fn start_pipeline_timer(&self, stack: &str) -> HistogramTimer {
        self.pipeline_duration
            .with_label_values(&[stack])
            .start_timer()
    }

    pub fn record_pipeline(&self, stack: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.pipeline_runs
            .with_label_values(&[stack, outcome])
            .inc();
    }

    pub fn record_fallback(&self, from: &str, to: &str) {
        self.encode_fallbacks.with_label_values(&[from, to]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_returns_same_instance() {
        let a = PipelineMetrics::global() as *const PipelineMetrics;
        let b = PipelineMetrics::global() as *const PipelineMetrics;
        assert_eq!(a, b);
    }

    #[test]
    fn test_counters_increment() {
        // Metrics are global; other tests may touch them concurrently
        let metrics = PipelineMetrics::global();
        let before = metrics
            .pipeline_runs
            .with_label_values(&["metrics-test", "success"])
            .get();
        metrics.record_pipeline("metrics-test", true);
        let after = metrics
            .pipeline_runs
            .with_label_values(&["metrics-test", "success"])
            .get();
        assert_eq!(after, before + 1);

        let before = metrics.store_hits.get();
        metrics.store_hits.inc();
        assert!(metrics.store_hits.get() > before);
    }

    #[test]
    fn test_pipeline_timer_observes_on_drop() {
        let metrics = PipelineMetrics::global();
        let histogram = metrics.pipeline_duration.with_label_values(&["timer-test"]);
        let before = histogram.get_sample_count();
        drop(metrics.start_pipeline_timer("timer-test"));
        assert_eq!(histogram.get_sample_count(), before + 1);
    }
}
