use crate::error::MeshProbeError;
use crate::mesh::MeshTool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One online peer from `tailscale status`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PeerRecord {
    pub address: String, // mesh address, e.g. 100.101.102.103
    pub hostname: String,
    pub user: String,
    pub os: String,
}

/// Run the directory command and keep every eligible peer, in output order.
pub async fn discover_peers(tool: &dyn MeshTool) -> Result<Vec<PeerRecord>, MeshProbeError> {
    let output = tool.status().await?;
    let peers = parse_status(&output);
    info!("Discovered {} online peers", peers.len());
    Ok(peers)
}

pub fn parse_status(output: &str) -> Vec<PeerRecord> {
    output.lines().filter_map(parse_status_line).collect()
}

fn parse_status_line(line: &str) -> Option<PeerRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        debug!("skipping short status line: {}", line);
        return None;
    }
    if fields[4..].iter().any(|f| is_self_marker(f)) {
        return None;
    }

    let status = fields[4..].join(" ");
    if status.contains("offline") {
        debug!("skipping offline peer {}", fields[1]);
        return None;
    }

    Some(PeerRecord {
        address: fields[0].to_string(),
        hostname: fields[1].to_string(),
        user: fields[2].to_string(),
        os: fields[3].to_string(),
    })
}

fn is_self_marker(field: &str) -> bool {
    field.trim_matches(|c| c == '(' || c == ')' || c == ';' || c == ',') == "Self"
}
