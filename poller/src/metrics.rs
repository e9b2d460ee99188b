use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref LOGINS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_logins_total",
        "Total successful logins"
    ))
    .expect("valid metric");
    pub static ref LOGIN_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_login_failures_total",
        "Total failed login attempts"
    ))
    .expect("valid metric");
    pub static ref FETCHES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_fetches_total",
        "Total telemetry requests sent"
    ))
    .expect("valid metric");
    pub static ref FETCH_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "poller_fetch_failures_total",
            "Total failed telemetry fetches by error kind"
        ),
        &["kind"]
    )
    .expect("valid metric");
    pub static ref POINTS_RECEIVED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_points_received_total",
        "Total telemetry data points received"
    ))
    .expect("valid metric");
    pub static ref FETCH_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "poller_fetch_latency_seconds",
            "Time taken by one telemetry request"
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    )
    .expect("valid metric");
    pub static ref NEXT_POLL_DELAY_SECONDS: Gauge = Gauge::with_opts(Opts::new(
        "poller_next_poll_delay_seconds",
        "Delay before the next poll, including backoff"
    ))
    .expect("valid metric");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(LOGINS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LOGIN_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POINTS_RECEIVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(NEXT_POLL_DELAY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
