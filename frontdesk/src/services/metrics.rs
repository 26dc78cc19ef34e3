use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static GUARD_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SESSION_RESOLUTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SESSION_RESOLUTION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

/// Register every collector. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }
    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;
    let guard_decisions = IntCounterVec::new(
        Opts::new("route_guard_decisions_total", "Route guard decisions"),
        &["decision"],
    )?;
    let resolutions = IntCounterVec::new(
        Opts::new(
            "session_resolutions_total",
            "Profile and permission resolutions by outcome",
        ),
        &["outcome"],
    )?;
    let resolution_duration = HistogramVec::new(
        HistogramOpts::new(
            "session_resolution_duration_seconds",
            "Time to fetch a profile and its permission grants",
        ),
        &["outcome"],
    )?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(guard_decisions.clone()))?;
    registry.register(Box::new(resolutions.clone()))?;
    registry.register(Box::new(resolution_duration.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = GUARD_DECISIONS_TOTAL.set(guard_decisions);
    let _ = SESSION_RESOLUTIONS_TOTAL.set(resolutions);
    let _ = SESSION_RESOLUTION_SECONDS.set(resolution_duration);
    Ok(())
}

pub fn record_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status = status.to_string();
    let labels = [method, path, status.as_str()];
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter.with_label_values(&labels).inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }
}

pub fn record_guard_decision(decision: &str) {
    if let Some(counter) = GUARD_DECISIONS_TOTAL.get() {
        counter.with_label_values(&[decision]).inc();
    }
}

pub fn record_session_resolution(outcome: &str, elapsed: Duration) {
    if let Some(counter) = SESSION_RESOLUTIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
    if let Some(histogram) = SESSION_RESOLUTION_SECONDS.get() {
        histogram
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }
}

/// Text exposition of every registered metric.
pub fn get_metrics() -> anyhow::Result<String> {
    let registry = REGISTRY
        .get()
        .ok_or_else(|| anyhow::anyhow!("metrics registry not initialized"))?;
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_exposed() {
        init_metrics().unwrap();
        init_metrics().unwrap();
        record_guard_decision("denied");
        record_session_resolution("resolved", Duration::from_millis(12));

        let text = get_metrics().unwrap();
        assert!(text.contains("route_guard_decisions_total"));
        assert!(text.contains("session_resolutions_total{outcome=\"resolved\"}"));
    }
}
