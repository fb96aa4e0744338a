//! Telemetry sink trait.
//!
//! The core only needs two operations from a metrics exporter: set a gauge
//! and bump a counter. Registration, naming rules, and scraping belong to
//! the exporter. Telemetry is observational: nothing in the core reads it
//! back or branches on it.

/// Gauge/counter sink consumed by actuators and meters.
pub trait Telemetry: Send + Sync {
    /// Set the instantaneous value of gauge `name`.
    fn set_gauge(&self, name: &str, value: f64);

    /// Add `delta` (non-negative) to counter `name`.
    fn add_counter(&self, name: &str, delta: f64);
}

/// Build the `<namespace>_physical_<name>_<suffix>` metric name used for
/// physical outputs.
pub fn physical_metric(namespace: &str, name: &str, suffix: &str) -> String {
    if namespace.is_empty() {
        format!("physical_{name}_{suffix}")
    } else {
        format!("{namespace}_physical_{name}_{suffix}")
    }
}
