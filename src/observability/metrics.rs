//! Counters emitted by the relay, and the Prometheus recorder that collects
//! them. `serve` installs the recorder and exposes it on `GET /metrics`.

use crate::core::error::{GatewayError, GatewayResult};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Cache lookups, labelled `outcome` = `hit` | `miss` | `error`
pub const CACHE_LOOKUPS_TOTAL: &str = "yt_relay_cache_lookups_total";

/// Cache writes, labelled `outcome` = `stored` | `present` | `error` | `skipped`
pub const CACHE_WRITES_TOTAL: &str = "yt_relay_cache_writes_total";

/// Playlist refresh attempts, labelled `outcome` = `success` | `failure` | `cooldown`
pub const ALLOWLIST_REFRESH_TOTAL: &str = "yt_relay_allowlist_refresh_total";

/// Install the global Prometheus recorder and describe the relay's counters.
/// Fails if a recorder is already installed in this process.
pub fn install_recorder() -> GatewayResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| GatewayError::internal(format!("failed to install metrics recorder: {}", e)))?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    describe_counter!(CACHE_LOOKUPS_TOTAL, "Response cache lookups by outcome");
    describe_counter!(CACHE_WRITES_TOTAL, "Response cache conditional writes by outcome");
    describe_counter!(ALLOWLIST_REFRESH_TOTAL, "Playlist allow-list refresh attempts by outcome");
}
