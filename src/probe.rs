use crate::mesh::MeshTool;
use crate::ranking;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::OnceLock;
use tracing::debug;

/// Public address and port a ping reported travelling through.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Egress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for Egress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// What one probe learned about one peer.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ProbeOutcome {
    /// Per-attempt round trip in milliseconds, in output order.
    pub samples: Vec<u32>,
    pub egress: Option<Egress>,
    /// Set when the probe itself failed; samples and egress are then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ProbeOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn mean_latency(&self) -> f64 {
        ranking::mean_latency(&self.samples)
    }
}

fn egress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"via (\d+\.\d+\.\d+\.\d+):(\d+)").expect("egress pattern compiles")
    })
}

fn latency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"in (\d+)ms").expect("latency pattern compiles"))
}

/// Extract latency samples and the egress pair from a ping transcript.
///
/// The last `via ip:port` wins. Relay hops such as `via DERP(fra)` carry no
/// address and are ignored.
pub fn parse_ping_output(output: &str) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();

    for line in output.lines() {
        if let Some(egress) = egress_pattern()
            .captures_iter(line)
            .filter_map(|caps| {
                let ip = caps[1].parse::<Ipv4Addr>().ok()?;
                let port = caps[2].parse::<u16>().ok()?;
                Some(Egress { ip, port })
            })
            .last()
        {
            outcome.egress = Some(egress);
        }

        outcome.samples.extend(
            latency_pattern()
                .captures_iter(line)
                .filter_map(|caps| caps[1].parse::<u32>().ok()),
        );
    }

    outcome
}

/// Ping one peer. Failures stay with this peer as an empty outcome.
pub async fn probe_peer(tool: &dyn MeshTool, address: &str, count: u32) -> ProbeOutcome {
    match tool.ping(address, count).await {
        Ok(output) => {
            let outcome = parse_ping_output(&output);
            debug!(
                "{}: {} samples, egress {}",
                address,
                outcome.samples.len(),
                outcome
                    .egress
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            outcome
        }
        Err(e) => {
            debug!("{}", e);
            ProbeOutcome::failed(e.to_string())
        }
    }
}
