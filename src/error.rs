use std::net::Ipv4Addr;
use thiserror::Error;

/// Every failure a run can surface.
///
/// `ToolUnavailable` and `Discovery` are fatal and happen before any probe is
/// dispatched. `NoPeers` ends the run without a report. The remaining variants
/// are contained at the peer boundary (or, for `PartialResults`, reported next
/// to the partial report) and never abort the run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshProbeError {
    #[error("tailscale is not installed or not running: {0}")]
    ToolUnavailable(String),

    #[error("tailscale status error: {0}")]
    Discovery(String),

    #[error("no active tailscale peers found")]
    NoPeers,

    #[error("ping {address} failed: {reason}")]
    ProbeFailure { address: String, reason: String },

    #[error("timed out waiting for probes: {completed}/{total} completed")]
    PartialResults { completed: usize, total: usize },

    #[error("isp lookup for {ip} failed: {reason}")]
    Enrichment { ip: Ipv4Addr, reason: String },
}
