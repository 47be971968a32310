use crate::peers::PeerRecord;
use crate::types::{EnrichedPeer, NatGroup, Report, RunSummary};
use serde::Serialize;

const HEADERS: [&str; 10] = [
    "#",
    "User",
    "Hostname",
    "OS",
    "Mesh IP",
    "Group",
    "External IP",
    "Port",
    "Ping",
    "ISP",
];

#[derive(Clone, Copy)]
enum Align {
    Left,
    Center,
    Right,
}

const ALIGN: [Align; 10] = [
    Align::Left,
    Align::Left,
    Align::Left,
    Align::Center,
    Align::Left,
    Align::Center,
    Align::Left,
    Align::Center,
    Align::Right,
    Align::Left,
];

/// One display line per peer, in ranked order.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ReportRow {
    pub rank: usize,
    pub user: String,
    pub hostname: String,
    pub os: String,
    pub address: String,
    pub group: String,
    pub external_ip: String,
    pub port: String,
    /// Mean latency in ms, absent when no sample was parsed.
    pub ping: Option<f64>,
    pub isp: String,
}

impl ReportRow {
    fn cells(&self) -> [String; 10] {
        [
            self.rank.to_string(),
            self.user.clone(),
            self.hostname.clone(),
            self.os.clone(),
            self.address.clone(),
            self.group.clone(),
            self.external_ip.clone(),
            self.port.clone(),
            ping_cell(self.ping),
            self.isp.clone(),
        ]
    }
}

pub fn rows(peers: &[EnrichedPeer]) -> Vec<ReportRow> {
    peers
        .iter()
        .enumerate()
        .map(|(i, p)| ReportRow {
            rank: i + 1,
            user: p.peer.user.clone(),
            hostname: p.peer.hostname.clone(),
            os: p.peer.os.clone(),
            address: p.peer.address.clone(),
            group: p.group.map(|g| g.label()).unwrap_or_default(),
            external_ip: p.probe.egress.map(|e| e.ip.to_string()).unwrap_or_default(),
            port: p.probe.egress.map(|e| e.port.to_string()).unwrap_or_default(),
            ping: (!p.probe.samples.is_empty()).then(|| p.probe.mean_latency()),
            isp: p
                .organization
                .as_ref()
                .map(|o| o.isp.clone())
                .unwrap_or_default(),
        })
        .collect()
}

pub fn ping_cell(ping: Option<f64>) -> String {
    ping.map(|ms| format!("{:.1}", ms))
        .unwrap_or_else(|| "-".to_string())
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let gap = width.saturating_sub(text.chars().count());
    match align {
        Align::Left => format!("{}{}", text, " ".repeat(gap)),
        Align::Right => format!("{}{}", " ".repeat(gap), text),
        Align::Center => {
            let left = gap / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(gap - left))
        }
    }
}

/// Bordered text table.
pub fn render_table(rows: &[ReportRow]) -> String {
    let body: Vec<[String; 10]> = rows.iter().map(ReportRow::cells).collect();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = {
        let segments: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        format!("+{}+\n", segments.join("+"))
    };
    let line = |cells: &[String], header: bool| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths.iter().zip(ALIGN.iter()))
            .map(|(cell, (&width, &align))| {
                pad(cell, width, if header { Align::Center } else { align })
            })
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };

    let mut out = String::new();
    out.push_str(&border);
    out.push_str(&line(&HEADERS.map(String::from)[..], true));
    out.push_str(&border);
    for cells in &body {
        out.push_str(&line(&cells[..], false));
    }
    out.push_str(&border);
    out
}

fn column_width<'a>(cells: impl Iterator<Item = &'a str>) -> usize {
    cells.map(|c| c.chars().count()).max().unwrap_or(0)
}

/// Plain column listing for the `peers` subcommand.
pub fn render_directory(peers: &[PeerRecord]) -> String {
    let address = column_width(peers.iter().map(|p| p.address.as_str()));
    let hostname = column_width(peers.iter().map(|p| p.hostname.as_str()));
    let user = column_width(peers.iter().map(|p| p.user.as_str()));

    peers
        .iter()
        .map(|p| {
            format!(
                "{}  {}  {}  {}\n",
                pad(&p.address, address, Align::Left),
                pad(&p.hostname, hostname, Align::Left),
                pad(&p.user, user, Align::Left),
                p.os
            )
        })
        .collect()
}

#[derive(Serialize)]
struct JsonReport<'a> {
    rows: Vec<ReportRow>,
    groups: &'a [NatGroup],
    summary: &'a RunSummary,
    shortfall: usize,
}

pub fn render_json(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        rows: rows(&report.peers),
        groups: &report.groups,
        summary: &report.summary,
        shortfall: report.summary.shortfall(),
    })
}
