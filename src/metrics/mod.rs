//! In-process counters for warehouse operations.
//!
//! Exposed as Prometheus text at `/metrics` and as JSON at `/metrics/json`.
//! Database timings go through the `metrics` crate macros in `db.rs` instead.

use axum::{http::header, response::IntoResponse, Json};
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

pub const INVENTORY_MOVES: &str = "binstock_inventory_moves_total";
pub const INVENTORY_ADJUSTMENTS: &str = "binstock_inventory_adjustments_total";
pub const IMPORT_RUNS: &str = "binstock_import_runs_total";
pub const IMPORT_ROWS: &str = "binstock_import_rows_total";
pub const IMPORT_BATCH_FAILURES: &str = "binstock_import_batch_failures_total";
pub const STOCK_COUNTS_STARTED: &str = "binstock_stock_counts_started_total";
pub const STOCK_COUNTS_COMPLETED: &str = "binstock_stock_counts_completed_total";
pub const STOCK_COUNT_ITEMS_COUNTED: &str = "binstock_stock_count_items_counted_total";
pub const LOGINS: &str = "binstock_logins_total";
pub const LOGIN_FAILURES: &str = "binstock_login_failures_total";
pub const OPEN_STOCK_COUNTS: &str = "binstock_stock_counts_open";

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> Counter {
        self.counters.entry(name.to_string()).or_default().clone()
    }

    pub fn gauge(&self, name: &str) -> Gauge {
        self.gauges.entry(name.to_string()).or_default().clone()
    }

    fn sorted_counters(&self) -> Vec<(String, u64)> {
        let mut rows: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        rows.sort();
        rows
    }

    fn sorted_gauges(&self) -> Vec<(String, i64)> {
        let mut rows: Vec<_> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        rows.sort();
        rows
    }

    /// Prometheus text exposition format.
    pub fn export_text(&self) -> String {
        let mut output = String::new();
        for (name, value) in self.sorted_counters() {
            output.push_str(&format!("# TYPE {} counter\n{} {}\n", name, name, value));
        }
        for (name, value) in self.sorted_gauges() {
            output.push_str(&format!("# TYPE {} gauge\n{} {}\n", name, name, value));
        }
        output
    }

    pub fn export_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<_, _> = self
            .sorted_counters()
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();
        let gauges: serde_json::Map<_, _> = self
            .sorted_gauges()
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();
        json!({ "counters": counters, "gauges": gauges })
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.counter(name).inc_by(value);
}

pub fn adjust_gauge(name: &str, delta: i64) {
    METRICS.gauge(name).add(delta);
}

pub fn set_gauge(name: &str, value: i64) {
    METRICS.gauge(name).set(value);
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_text(),
    )
}

pub async fn metrics_json_handler() -> impl IntoResponse {
    Json(METRICS.export_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exports_sorted_text() {
        let registry = MetricsRegistry::new();
        registry.counter("b_total").inc_by(3);
        registry.counter("a_total").inc();
        registry.gauge("open").set(2);

        let text = registry.export_text();
        let a = text.find("a_total 1").unwrap();
        let b = text.find("b_total 3").unwrap();
        assert!(a < b);
        assert!(text.contains("# TYPE open gauge\nopen 2\n"));
    }

    #[test]
    fn registry_exports_json() {
        let registry = MetricsRegistry::new();
        registry.counter("moves").inc();
        registry.gauge("open").add(-1);

        let value = registry.export_json();
        assert_eq!(value["counters"]["moves"], 1);
        assert_eq!(value["gauges"]["open"], -1);
    }

    #[test]
    fn set_gauge_overwrites_drifted_value() {
        adjust_gauge("test_seeded_gauge", -3);
        set_gauge("test_seeded_gauge", 4);
        assert_eq!(METRICS.gauge("test_seeded_gauge").get(), 4);
    }
}
