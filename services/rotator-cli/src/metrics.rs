//! Prometheus exposition for rotator metrics
//!
//! The core emits through the `metrics` facade; this installs the recorder
//! that collects them so `--metrics` can print the text exposition.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use proxy_rotator::{NamespaceConfig, Rotator};

    #[test]
    fn rotator_metrics_render_in_exposition_format() {
        // build_recorder() instead of install_recorder(): only one global
        // recorder may exist per process.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let rotator = Rotator::new();
        rotator.set_namespace(NamespaceConfig::new("search"));
        rotator.set_pool(["http://10.0.0.1:3128"]);
        rotator.lease(Some("search")).unwrap();

        let output = handle.render();
        assert!(
            output.contains("# TYPE rotator_leases_total counter"),
            "got:\n{output}"
        );
        assert!(output.contains("namespace=\"search\""));
        assert!(output.contains("# TYPE rotator_pool_size gauge"));
    }
}
