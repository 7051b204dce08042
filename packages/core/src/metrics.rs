//! Prometheus metrics registry for the review server.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the backend client, the frame store and the HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`), outside the session guard.

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry,
};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// HTTP request count, labelled by method, route and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// Calls made to the analysis backend, labelled by endpoint and outcome.
    pub backend_requests_total: CounterVec,
    /// Frame batches that failed and left their slots empty.
    pub frame_batches_failed_total: Counter,
    /// Frames currently held in the frame store.
    pub frames_cached: Gauge,
    /// Login attempts, labelled by outcome.
    pub logins_total: CounterVec,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new(
                "blinkdx_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "blinkdx_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        let backend_requests_total = CounterVec::new(
            Opts::new(
                "blinkdx_backend_requests_total",
                "Analysis backend calls by endpoint and outcome",
            ),
            &["endpoint", "outcome"],
        )?;

        let frame_batches_failed_total = Counter::with_opts(Opts::new(
            "blinkdx_frame_batches_failed_total",
            "Frame batches that could not be fetched",
        ))?;

        let frames_cached = Gauge::with_opts(Opts::new(
            "blinkdx_frames_cached",
            "Frames currently held in memory",
        ))?;

        let logins_total = CounterVec::new(
            Opts::new("blinkdx_logins_total", "Login attempts by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(backend_requests_total.clone()))?;
        registry.register(Box::new(frame_batches_failed_total.clone()))?;
        registry.register(Box::new(frames_cached.clone()))?;
        registry.register(Box::new(logins_total.clone()))?;

        Ok(Self {
            http_requests_total,
            http_request_duration,
            backend_requests_total,
            frame_batches_failed_total,
            frames_cached,
            logins_total,
            registry,
        })
    }

    pub fn record_backend(&self, endpoint: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.backend_requests_total
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    pub fn record_login(&self, outcome: &str) {
        self.logins_total.with_label_values(&[outcome]).inc();
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
