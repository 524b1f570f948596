use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record an intent creation.
pub fn record_intent_created(fee_type: &str) {
    metrics::counter!("fees_intents_created_total", "fee_type" => fee_type.to_string())
        .increment(1);
}

/// Record a settlement and the rupees moved into the ledger.
pub fn record_settlement(method: &'static str, fee_type: &str, amount: i64) {
    metrics::counter!(
        "fees_settlements_total",
        "method" => method,
        "fee_type" => fee_type.to_string()
    )
    .increment(1);
    metrics::counter!("fees_settled_amount_rupees_total", "method" => method)
        .increment(amount.max(0) as u64);
}

/// Record a read-time expiry reclassification.
pub fn record_intent_expired() {
    metrics::counter!("fees_intents_expired_total").increment(1);
}
