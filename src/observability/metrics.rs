use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use tracing::info;
use std::sync::Arc;
use tokio::sync::OnceCell;


// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the process-wide `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| async {
        info!("Initializing Metrics ...");
        Metrics::new()}
    ).await
}


#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Token endpoint metrics
    pub token_requests: IntCounterVec,
    pub token_request_failures: IntCounterVec,
    pub token_request_duration: HistogramVec,

    // Discovery metrics
    pub discovery_requests: IntCounter,
    pub discovery_failures: IntCounter,

    // Cache metrics
    pub cache_hits: IntCounterVec,
    pub cache_refreshes: IntCounterVec,
    pub token_expiry_unix: IntGaugeVec,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("fhirauth".into()), None).expect("valid registry prefix");

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Token endpoint
            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Token exchange attempts by endpoint and auth method"), &["endpoint", "auth_method"]).expect("valid metric"),
            token_request_failures: IntCounterVec::new(Opts::new("token_request_failures_total", "Token exchange failures by reason"), &["endpoint", "reason"]).expect("valid metric"),
            token_request_duration: HistogramVec::new(HistogramOpts::new("token_request_duration_seconds", "Token exchange duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["endpoint"]).expect("valid metric"),

            // Discovery
            discovery_requests: IntCounter::new("discovery_requests_total", "SMART configuration fetches").expect("valid metric"),
            discovery_failures: IntCounter::new("discovery_failures_total", "Failed SMART configuration fetches").expect("valid metric"),

            // Cache
            cache_hits: IntCounterVec::new(Opts::new("cache_hits_total", "Tokens served from cache"), &["endpoint"]).expect("valid metric"),
            cache_refreshes: IntCounterVec::new(Opts::new("cache_refreshes_total", "Refreshes started on a missing or stale token"), &["endpoint"]).expect("valid metric"),
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_unix_seconds", "Cached token expiry timestamp"), &["endpoint", "client_id"]).expect("valid metric"),

            // Config/runtime
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").expect("valid metric"),
            up: IntGauge::new("up", "1 if service is healthy").expect("valid metric"),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.token_requests.clone()),
            Box::new(metrics.token_request_failures.clone()),
            Box::new(metrics.token_request_duration.clone()),
            Box::new(metrics.discovery_requests.clone()),
            Box::new(metrics.discovery_failures.clone()),
            Box::new(metrics.cache_hits.clone()),
            Box::new(metrics.cache_refreshes.clone()),
            Box::new(metrics.token_expiry_unix.clone()),
            Box::new(metrics.config_validation_errors.clone()),
            Box::new(metrics.up.clone()),
        ];
        for collector in collectors {
            reg.register(collector).expect("metric registered once");
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, TextEncoder};

    use super::get_metrics;

    #[tokio::test]
    async fn registry_exposes_namespaced_metrics() {
        let metrics = get_metrics().await;
        metrics.cache_hits.with_label_values(&["https://auth.example.com/token"]).inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let rendered = String::from_utf8(buffer).unwrap();
        assert!(rendered.contains("fhirauth_cache_hits_total"));
    }
}
