use crate::enrich::Organization;
use crate::peers::PeerRecord;
use crate::probe::ProbeOutcome;
use crate::ranking::{group_letters, is_public_ip};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;

pub type GenericBoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// A peer's membership in a nat group.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupTag {
    pub id: u32,
    pub members: usize,
}

impl GroupTag {
    /// `A (3)` for the first group with three members.
    pub fn label(&self) -> String {
        format!("{} ({})", group_letters(self.id), self.members)
    }
}

/// Peers observed leaving through the same public address.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NatGroup {
    pub id: u32,
    pub egress_ip: Ipv4Addr,
    pub members: usize,
}

#[derive(Serialize, Clone, Debug)]
pub struct EnrichedPeer {
    #[serde(flatten)]
    pub peer: PeerRecord,
    pub probe: ProbeOutcome,
    pub organization: Option<Organization>,
    pub group: Option<GroupTag>,
}

impl EnrichedPeer {
    pub fn new(peer: PeerRecord, probe: ProbeOutcome) -> Self {
        Self {
            peer,
            probe,
            organization: None,
            group: None,
        }
    }

    pub fn public_egress_ip(&self) -> Option<Ipv4Addr> {
        self.probe
            .egress
            .map(|egress| egress.ip)
            .filter(|ip| is_public_ip(IpAddr::V4(*ip)))
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub dispatched: usize,
    pub completed: usize,
    pub collected: usize,
    pub lookups: usize,
}

impl RunSummary {
    /// Peers dispatched but missing from the report.
    pub fn shortfall(&self) -> usize {
        self.dispatched.saturating_sub(self.collected)
    }
}

/// Everything handed to the presentation layer.
#[derive(Serialize, Clone, Debug)]
pub struct Report {
    pub peers: Vec<EnrichedPeer>,
    pub groups: Vec<NatGroup>,
    pub summary: RunSummary,
}
