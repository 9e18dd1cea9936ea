//! Metrics
//!
//! Counters for the HMRC connection flows.

use std::collections::HashMap;
use std::sync::Mutex;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// MTD flow metrics interface.
pub trait MtdMetrics: Send + Sync {
    /// Record a protected endpoint call and the HTTP status, if any.
    fn record_endpoint_call(&self, endpoint: &str, status: Option<u16>);

    /// Record an authorization request (tracker opened).
    fn record_authorization_request(&self, api_id: &str);

    /// Record a code exchange.
    fn record_token_exchange(&self, api_id: &str, success: bool);

    /// Record a token refresh.
    fn record_token_refresh(&self, api_id: &str, success: bool);

    /// Record a flow that ended in an error.
    fn record_error(&self, error_code: &str, api_id: &str);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl MtdMetrics for NoOpMetrics {
    fn record_endpoint_call(&self, _endpoint: &str, _status: Option<u16>) {}
    fn record_authorization_request(&self, _api_id: &str) {}
    fn record_token_exchange(&self, _api_id: &str, _success: bool) {}
    fn record_token_refresh(&self, _api_id: &str, _success: bool) {}
    fn record_error(&self, _error_code: &str, _api_id: &str) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
}

/// In-memory metrics for testing.
#[derive(Default)]
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Sum of a counter across all label sets.
    pub fn total(&self, name: &str) -> f64 {
        self.get_entries_by_name(name).iter().map(|e| e.value).sum()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn record(&self, name: &str, labels: &[(&str, String)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        self.entries.lock().unwrap().push(MetricEntry {
            name: name.to_string(),
            value: 1.0,
            labels,
        });
    }
}

impl MtdMetrics for InMemoryMetrics {
    fn record_endpoint_call(&self, endpoint: &str, status: Option<u16>) {
        let status = status.map_or_else(|| "none".to_string(), |s| s.to_string());
        self.record(
            "mtd_endpoint_calls_total",
            &[("endpoint", endpoint.to_string()), ("status", status)],
        );
    }

    fn record_authorization_request(&self, api_id: &str) {
        self.record(
            "mtd_authorization_requests_total",
            &[("api_id", api_id.to_string())],
        );
    }

    fn record_token_exchange(&self, api_id: &str, success: bool) {
        self.record(
            "mtd_token_exchanges_total",
            &[("api_id", api_id.to_string()), ("success", success.to_string())],
        );
    }

    fn record_token_refresh(&self, api_id: &str, success: bool) {
        self.record(
            "mtd_token_refreshes_total",
            &[("api_id", api_id.to_string()), ("success", success.to_string())],
        );
    }

    fn record_error(&self, error_code: &str, api_id: &str) {
        self.record(
            "mtd_errors_total",
            &[("error_code", error_code.to_string()), ("api_id", api_id.to_string())],
        );
    }
}
