//! Prometheus metrics for the explanation service.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup. The helper functions
//! (`inc_request`, `add_tokens`, …) are no-ops if `init_metrics` was never
//! called, so the orchestrator is always safe to run and observability simply
//! degrades gracefully.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `explain_requests_total` | Counter | `complexity`, `outcome` |
//! | `explain_tokens_total` | Counter | `model` |
//! | `explain_upstream_duration_seconds` | Histogram | `provider` |

use crate::OrchestratorError;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;
use std::time::Duration;

/// All Prometheus metrics for the service, stored in a single [`OnceLock`].
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Explain requests by complexity tier and outcome.
    pub requests_total: CounterVec,
    /// Tokens reported by the provider, by model.
    pub tokens_total: CounterVec,
    /// Provider call latency.
    pub upstream_duration: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Request outcome label values.
pub mod outcome {
    /// Request produced an explanation.
    pub const SUCCESS: &str = "success";
    /// Request was rejected by validation.
    pub const INVALID_INPUT: &str = "invalid_input";
    /// Provider call failed.
    pub const UPSTREAM_FAILURE: &str = "upstream_failure";
}

fn build_metrics() -> Result<Metrics, prometheus::Error> {
    let registry = Registry::new();

    let requests_total = CounterVec::new(
        Opts::new("explain_requests_total", "Explain requests by tier and outcome"),
        &["complexity", "outcome"],
    )?;
    registry.register(Box::new(requests_total.clone()))?;

    let tokens_total = CounterVec::new(
        Opts::new("explain_tokens_total", "Tokens reported by the provider"),
        &["model"],
    )?;
    registry.register(Box::new(tokens_total.clone()))?;

    let upstream_duration = HistogramVec::new(
        HistogramOpts::new(
            "explain_upstream_duration_seconds",
            "Provider call duration",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["provider"],
    )?;
    registry.register(Box::new(upstream_duration.clone()))?;

    Ok(Metrics {
        registry,
        requests_total,
        tokens_total,
        upstream_duration,
    })
}

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if metric construction or registry
/// registration fails.
pub fn init_metrics() -> Result<(), OrchestratorError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let metrics =
        build_metrics().map_err(|e| OrchestratorError::Other(format!("metrics init failed: {e}")))?;

    // A racing initialiser builds identical descriptors; first one wins.
    let _ = METRICS.set(metrics);

    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Count one explain request. No-op before [`init_metrics`].
pub fn inc_request(complexity: &str, outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .requests_total
            .get_metric_with_label_values(&[complexity, outcome])
        {
            c.inc();
        }
    }
}

/// Add provider-reported tokens for `model`. No-op before [`init_metrics`].
pub fn add_tokens(model: &str, tokens: u64) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.tokens_total.get_metric_with_label_values(&[model]) {
            c.inc_by(tokens as f64);
        }
    }
}

/// Observe one provider call duration. No-op before [`init_metrics`].
pub fn record_upstream_latency(provider: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.upstream_duration.get_metric_with_label_values(&[provider]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
pub fn gather_metrics() -> String {
    let Some(m) = metrics() else {
        return String::new();
    };
    let families = m.registry.gather();
    let mut buffer = Vec::new();
    if TextEncoder::new().encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_metrics_registers_all_families() {
        let m = build_metrics().expect("metrics must build");
        m.requests_total
            .with_label_values(&["eli5", outcome::SUCCESS])
            .inc();
        m.tokens_total.with_label_values(&["gpt-4o-mini"]).inc_by(120.0);
        m.upstream_duration
            .with_label_values(&["echo"])
            .observe(0.2);

        let names: Vec<String> = m
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"explain_requests_total".to_string()));
        assert!(names.contains(&"explain_tokens_total".to_string()));
        assert!(names.contains(&"explain_upstream_duration_seconds".to_string()));
    }

    #[test]
    fn test_local_counter_tracks_tokens() {
        let m = build_metrics().expect("metrics must build");
        m.tokens_total.with_label_values(&["m"]).inc_by(120.0);
        m.tokens_total.with_label_values(&["m"]).inc_by(30.0);
        let v = m.tokens_total.with_label_values(&["m"]).get();
        assert!((v - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_helpers_do_not_panic() {
        inc_request("eli5", outcome::INVALID_INPUT);
        add_tokens("gpt-4o-mini", 10);
        record_upstream_latency("echo", Duration::from_millis(5));
    }

    #[test]
    fn test_gather_after_init_contains_request_counter() {
        init_metrics().expect("init");
        inc_request("expert", outcome::SUCCESS);
        let text = gather_metrics();
        assert!(text.contains("explain_requests_total"));
    }
}
