//! Prometheus metrics for the submission pipeline.
//!
//! Counters are always recorded through the `metrics` facade; they are only
//! exported when a listen address is configured.

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

use crate::error::{QuickpitchError, Result};

static INIT: Once = Once::new();

/// Builds a metric name with the crate prefix: `quickpitch_{name}_total`.
macro_rules! counter_name {
    ($name:literal) => {
        concat!("quickpitch_", $name, "_total")
    };
}

/// Installs the Prometheus exporter on `listen`. Idempotent; later calls are ignored.
pub fn init_metrics(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| QuickpitchError::Config(format!("invalid metrics listen address '{listen}': {e}")))?;

    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Prometheus exporter install failed: {}", e),
        }
    });
    Ok(())
}

/// Counters for the submission lifecycle.
pub struct SubmissionMetrics;

impl SubmissionMetrics {
    pub fn record_started() {
        ::metrics::counter!(counter_name!("submissions_started")).increment(1);
    }

    /// `outcome` is one of `queued`, `already_finalized`, `incomplete` or `error`.
    pub fn record_finalize(outcome: &'static str) {
        ::metrics::counter!(counter_name!("finalize_results"), "outcome" => outcome).increment(1);
    }

    /// `result` is one of `applied`, `rejected`, `ignored` or `error`.
    pub fn record_webhook(result: &'static str) {
        ::metrics::counter!(counter_name!("webhook_events"), "result" => result).increment(1);
    }
}
