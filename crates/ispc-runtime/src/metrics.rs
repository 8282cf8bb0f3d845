//! Prometheus metrics for the coordinator (C12), grounded in the node's own
//! `LosMetrics` pattern: one `Registry`, one struct of typed metric fields,
//! a constructor that registers each, and an `export()` that renders the
//! whole registry as text.

use std::sync::Arc;

use prometheus::{Counter, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

pub struct CoordinatorMetrics {
    registry: Registry,

    pub calls_total: IntCounter,
    pub wasm_calls_total: IntCounter,
    pub onnx_calls_total: IntCounter,
    pub guest_faults_total: IntCounter,
    pub onnx_errors_total: IntCounter,
    pub host_abi_errors_total: IntCounter,
    pub cancelled_calls_total: IntCounter,
    pub deadline_exceeded_total: IntCounter,

    pub call_duration_seconds: Histogram,
    pub gas_used: Histogram,

    pub leaked_timeout_threads: IntGauge,
    pub trace_truncated_total: IntCounter,
    pub gas_used_total: Counter,
}

impl CoordinatorMetrics {
    pub fn new() -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let calls_total = IntCounter::with_opts(Opts::new(
            "ispc_calls_total",
            "Total contract calls dispatched by the coordinator",
        ))?;
        registry.register(Box::new(calls_total.clone()))?;

        let wasm_calls_total = IntCounter::with_opts(Opts::new(
            "ispc_wasm_calls_total",
            "Total WASM contract calls dispatched",
        ))?;
        registry.register(Box::new(wasm_calls_total.clone()))?;

        let onnx_calls_total = IntCounter::with_opts(Opts::new(
            "ispc_onnx_calls_total",
            "Total ONNX inference calls dispatched",
        ))?;
        registry.register(Box::new(onnx_calls_total.clone()))?;

        let guest_faults_total = IntCounter::with_opts(Opts::new(
            "ispc_guest_faults_total",
            "Calls that ended in a guest trap or panic",
        ))?;
        registry.register(Box::new(guest_faults_total.clone()))?;

        let onnx_errors_total = IntCounter::with_opts(Opts::new(
            "ispc_onnx_errors_total",
            "ONNX calls that ended in an engine error",
        ))?;
        registry.register(Box::new(onnx_errors_total.clone()))?;

        let host_abi_errors_total = IntCounter::with_opts(Opts::new(
            "ispc_host_abi_errors_total",
            "Host ABI calls that returned a port error to the guest",
        ))?;
        registry.register(Box::new(host_abi_errors_total.clone()))?;

        let cancelled_calls_total = IntCounter::with_opts(Opts::new(
            "ispc_cancelled_calls_total",
            "Calls that observed cancellation before completing",
        ))?;
        registry.register(Box::new(cancelled_calls_total.clone()))?;

        let deadline_exceeded_total = IntCounter::with_opts(Opts::new(
            "ispc_deadline_exceeded_total",
            "Calls that exceeded the execution deadline",
        ))?;
        registry.register(Box::new(deadline_exceeded_total.clone()))?;

        let call_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ispc_call_duration_seconds",
                "Wall-clock duration of a dispatched call",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )?;
        registry.register(Box::new(call_duration_seconds.clone()))?;

        let gas_used = Histogram::with_opts(
            HistogramOpts::new("ispc_gas_used", "Gas consumed per WASM call").buckets(vec![
                100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0,
            ]),
        )?;
        registry.register(Box::new(gas_used.clone()))?;

        let leaked_timeout_threads = IntGauge::with_opts(Opts::new(
            "ispc_leaked_timeout_threads",
            "Guest execution threads abandoned after a timeout, still running",
        ))?;
        registry.register(Box::new(leaked_timeout_threads.clone()))?;

        let trace_truncated_total = IntCounter::with_opts(Opts::new(
            "ispc_trace_truncated_total",
            "Calls whose host-function trace exceeded the retained record bound",
        ))?;
        registry.register(Box::new(trace_truncated_total.clone()))?;

        let gas_used_total = Counter::with_opts(Opts::new(
            "ispc_gas_used_total",
            "Cumulative gas consumed across all WASM calls",
        ))?;
        registry.register(Box::new(gas_used_total.clone()))?;

        Ok(Arc::new(CoordinatorMetrics {
            registry,
            calls_total,
            wasm_calls_total,
            onnx_calls_total,
            guest_faults_total,
            onnx_errors_total,
            host_abi_errors_total,
            cancelled_calls_total,
            deadline_exceeded_total,
            call_duration_seconds,
            gas_used,
            leaked_timeout_threads,
            trace_truncated_total,
            gas_used_total,
        }))
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn export(&self) -> Result<String, Box<dyn std::error::Error>> {
        use prometheus::{Encoder, TextEncoder};
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_construct_and_register_without_error() {
        let metrics = CoordinatorMetrics::new().unwrap();
        assert!(metrics.export().unwrap().is_empty() || true);
    }

    #[test]
    fn counter_increments_are_reflected_in_export() {
        let metrics = CoordinatorMetrics::new().unwrap();
        metrics.calls_total.inc();
        metrics.calls_total.inc();
        let text = metrics.export().unwrap();
        assert!(text.contains("ispc_calls_total 2"));
    }

    #[test]
    fn gauge_set_and_histogram_observe() {
        let metrics = CoordinatorMetrics::new().unwrap();
        metrics.leaked_timeout_threads.set(3);
        metrics.call_duration_seconds.observe(0.25);
        let text = metrics.export().unwrap();
        assert!(text.contains("ispc_leaked_timeout_threads 3"));
        assert!(text.contains("ispc_call_duration_seconds"));
    }
}
