//! In-memory stand-ins for the mesh tool and the isp lookup.

use crate::enrich::{IpInfo, OrgLookup};
use crate::error::MeshProbeError;
use crate::mesh::MeshTool;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum FakePing {
    Reply(String),
    Fail,
    /// Reply after a delay.
    Slow(Duration, String),
    /// Never returns.
    Hang,
}

pub struct FakeMesh {
    version: Result<String, MeshProbeError>,
    status: Result<String, MeshProbeError>,
    pings: HashMap<String, FakePing>,
    ping_calls: AtomicUsize,
}

impl FakeMesh {
    pub fn new(status: &str) -> Self {
        Self {
            version: Ok("1.76.1".to_string()),
            status: Ok(status.to_string()),
            pings: HashMap::new(),
            ping_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_status(reason: &str) -> Self {
        Self {
            status: Err(MeshProbeError::Discovery(reason.to_string())),
            ..Self::new("")
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            version: Err(MeshProbeError::ToolUnavailable(reason.to_string())),
            ..Self::new("")
        }
    }

    pub fn with_ping(mut self, address: &str, ping: FakePing) -> Self {
        self.pings.insert(address.to_string(), ping);
        self
    }

    pub fn pings(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeshTool for FakeMesh {
    async fn version(&self) -> Result<String, MeshProbeError> {
        self.version.clone()
    }

    async fn status(&self) -> Result<String, MeshProbeError> {
        self.status.clone()
    }

    async fn ping(&self, address: &str, _count: u32) -> Result<String, MeshProbeError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        let failure = MeshProbeError::ProbeFailure {
            address: address.to_string(),
            reason: "exit status: 1".to_string(),
        };
        match self.pings.get(address).cloned() {
            Some(FakePing::Reply(output)) => Ok(output),
            Some(FakePing::Slow(delay, output)) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
            Some(FakePing::Hang) => std::future::pending().await,
            Some(FakePing::Fail) | None => Err(failure),
        }
    }
}

/// Answers from a fixed ip to isp table and counts calls.
#[derive(Default)]
pub struct FakeLookup {
    isps: HashMap<Ipv4Addr, String>,
    calls: AtomicUsize,
}

impl FakeLookup {
    pub fn with_isp(mut self, ip: Ipv4Addr, isp: &str) -> Self {
        self.isps.insert(ip, isp.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrgLookup for FakeLookup {
    async fn lookup(&self, ip: Ipv4Addr) -> Result<IpInfo, MeshProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.isps.get(&ip) {
            Some(isp) => Ok(IpInfo {
                status: "success".to_string(),
                isp: isp.clone(),
                country: "Netherlands".to_string(),
                region: "North Holland".to_string(),
                city: "Amsterdam".to_string(),
            }),
            None => Err(MeshProbeError::Enrichment {
                ip,
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// A ping transcript with one egress line followed by plain pongs.
pub fn transcript(egress: Option<&str>, samples: &[u32]) -> String {
    samples
        .iter()
        .enumerate()
        .map(|(i, ms)| match egress {
            Some(via) if i == 0 => format!("pong from peer (100.64.0.1) via {} in {}ms\n", via, ms),
            _ => format!("pong from peer (100.64.0.1) via DERP(fra) in {}ms\n", ms),
        })
        .collect()
}
