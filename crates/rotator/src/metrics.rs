//! Lease metrics
//!
//! Emitted through the `metrics` facade; whichever recorder the host process
//! installs decides where they go.
//!
//! - `rotator_leases_total` (counter): labels `namespace`, `outcome`
//! - `rotator_pool_size` (gauge)

/// `namespace` label used for leases against keys that were never configured.
pub const UNKNOWN_NAMESPACE: &str = "unknown";

/// Record one lease attempt. `outcome` is `leased` or an `Error::label`.
pub fn record_lease(namespace: &str, outcome: &'static str) {
    metrics::counter!(
        "rotator_leases_total",
        "namespace" => namespace.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the size of the pool after an accepted replacement.
pub fn record_pool_size(size: usize) {
    metrics::gauge!("rotator_pool_size").set(size as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NamespaceConfig, Rotator, RotatorSettings};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_lease("_global", "leased");
        record_pool_size(3);
    }

    #[test]
    fn lease_outcomes_are_counted_by_label() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let rotator = Rotator::with_settings(RotatorSettings {
            default_cooldown: Duration::from_secs(60),
            max_jitter: Duration::ZERO,
        });
        rotator.set_namespace(NamespaceConfig::new("search"));
        rotator.set_pool(["p1", "p2"]);

        rotator.lease(None).unwrap();
        rotator.lease(None).unwrap();
        rotator.lease(None).unwrap_err();
        rotator.lease(Some("missing")).unwrap_err();
        rotator.lease(Some("typo-1")).unwrap_err();
        rotator.lease(Some("search")).unwrap();

        let output = handle.render();
        assert!(
            output.contains("rotator_leases_total"),
            "counter must be rendered, got:\n{output}"
        );
        assert!(output.contains("outcome=\"leased\""));
        assert!(output.contains("outcome=\"no_available_resource\""));
        assert!(output.contains("outcome=\"unknown_namespace\""));
        assert!(output.contains("namespace=\"search\""));
        assert!(output.contains("namespace=\"unknown\""));
        assert!(
            !output.contains("missing") && !output.contains("typo-1"),
            "unconfigured keys must not become label values, got:\n{output}"
        );
        assert!(
            output.contains("# TYPE rotator_pool_size gauge"),
            "pool gauge must be rendered, got:\n{output}"
        );
    }
}
