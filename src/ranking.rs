use crate::types::{EnrichedPeer, GroupTag, NatGroup};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Address blocks that never count as a public egress.
const RESERVED_V4: [(Ipv4Addr, u8); 6] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(100, 64, 0, 0), 10), // carrier-grade nat
];

/// True for an address outside every reserved block. Ipv4-mapped v6
/// addresses are judged by their v4 part.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(true, is_public_v4),
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    !RESERVED_V4
        .iter()
        .any(|&(network, prefix)| in_block(ip, network, prefix))
}

fn in_block(ip: Ipv4Addr, network: Ipv4Addr, prefix: u8) -> bool {
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    u32::from(ip) & mask == u32::from(network) & mask
}

/// Arithmetic mean in milliseconds; an empty sequence has mean 0.
pub fn mean_latency(samples: &[u32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: u64 = samples.iter().map(|&ms| u64::from(ms)).sum();
    total as f64 / samples.len() as f64
}

/// Tag every peer behind a public egress with its nat group.
///
/// Group ids start at 1 and follow the order in which each egress address is
/// first seen in `peers`. Peers without a public egress are left untagged.
pub fn assign_groups(peers: &mut [EnrichedPeer]) -> Vec<NatGroup> {
    let mut groups: Vec<NatGroup> = Vec::new();
    let mut by_ip: HashMap<Ipv4Addr, usize> = HashMap::new();

    for ip in peers.iter().filter_map(EnrichedPeer::public_egress_ip) {
        match by_ip.entry(ip) {
            Entry::Occupied(slot) => groups[*slot.get()].members += 1,
            Entry::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push(NatGroup {
                    id: groups.len() as u32 + 1,
                    egress_ip: ip,
                    members: 1,
                });
            }
        }
    }

    for group in &groups {
        debug!(
            "nat group {} via {} with {} peers",
            group_letters(group.id),
            group.egress_ip,
            group.members
        );
    }

    for peer in peers.iter_mut() {
        peer.group = peer.public_egress_ip().map(|ip| {
            let group = &groups[by_ip[&ip]];
            GroupTag {
                id: group.id,
                members: group.members,
            }
        });
    }

    groups
}

/// Grouped peers first by group id, then by mean latency. Peers with no
/// samples have an unknown latency and go last within their group.
pub fn compare_peers(a: &EnrichedPeer, b: &EnrichedPeer) -> Ordering {
    let group = |p: &EnrichedPeer| (p.group.is_none(), p.group.map(|g| g.id));
    group(a)
        .cmp(&group(b))
        .then_with(|| a.probe.samples.is_empty().cmp(&b.probe.samples.is_empty()))
        .then_with(|| a.probe.mean_latency().total_cmp(&b.probe.mean_latency()))
}

/// Stable, so peers that compare equal keep their directory order.
pub fn rank(peers: &mut [EnrichedPeer]) {
    peers.sort_by(compare_peers);
}

/// Spreadsheet-style letters: 1 is A, 26 is Z, 27 is AA.
pub fn group_letters(id: u32) -> String {
    let mut n = id;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}
