mod config;
mod enrich;
mod error;
#[cfg(test)]
mod fakes;
mod mesh;
mod outcome_stream;
mod peers;
mod probe;
mod ranking;
mod report;
mod select_stream_or_deadline;
mod types;
mod workers;

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use config::RunConfig;
use enrich::{enrich_peers, IpApiLookup, OrgLookup};
use error::MeshProbeError;
use mesh::{MeshTool, TailscaleCli};
use peers::discover_peers;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use types::{EnrichedPeer, Report, RunSummary};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ")"
);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_version = LONG_VERSION)]
struct Args {
    #[arg(long, help = "Path to the tailscale binary")]
    tailscale: Option<PathBuf>,

    /// Skip the ISP lookup for public egress addresses
    #[arg(long)]
    no_isp: bool,

    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List online peers without probing them
    Peers,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    /// Bordered table
    Table,
    /// One JSON document
    Json,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn fatal_message(e: &MeshProbeError) -> String {
    format!("Error: {}", e)
}

/// Printed unconditionally; logging may be filtered off.
fn fatal(e: MeshProbeError) -> ! {
    let message = fatal_message(&e);
    eprintln!("{}", message);
    debug!("{:?}", e);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = RunConfig {
        tool_path: args.tailscale.clone(),
        show_progress: !args.quiet && std::io::stderr().is_terminal(),
        enrich: !args.no_isp,
        ..RunConfig::default()
    };

    let tool: Arc<dyn MeshTool> = match TailscaleCli::for_host(config.tool_path.clone()) {
        Ok(cli) => {
            info!("Using {}", cli.binary().display());
            Arc::new(cli)
        }
        Err(e) => fatal(e),
    };

    if let Some(Command::Peers) = &args.command {
        let peers = match list_peers(tool.as_ref()).await {
            Ok(peers) => peers,
            Err(e) => fatal(e),
        };
        match args.output {
            OutputFormat::Table => print!("{}", report::render_directory(&peers)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&peers)?),
        }
        return Ok(());
    }

    let lookup = IpApiLookup::new(config.lookup_endpoint.clone(), config.lookup_timeout);
    match run(tool, Some(&lookup as &dyn OrgLookup), &config).await {
        Ok(report) => {
            match args.output {
                OutputFormat::Table => {
                    print!("{}", report::render_table(&report::rows(&report.peers)))
                }
                OutputFormat::Json => println!("{}", report::render_json(&report)?),
            }
            if report.summary.shortfall() > 0 {
                eprintln!(
                    "Only {}/{} peers answered before the timeout",
                    report.summary.collected, report.summary.dispatched
                );
            }
        }
        Err(MeshProbeError::NoPeers) => println!("No active Tailscale peers found"),
        Err(e) => fatal(e),
    }

    Ok(())
}

async fn list_peers(tool: &dyn MeshTool) -> Result<Vec<peers::PeerRecord>, MeshProbeError> {
    tool.version().await?;
    discover_peers(tool).await
}

/// Discover, probe, enrich, group and rank.
///
/// Fatal errors are returned before any probe starts. A timeout still yields
/// a report, with the shortfall recorded in its summary.
async fn run(
    tool: Arc<dyn MeshTool>,
    lookup: Option<&dyn OrgLookup>,
    config: &RunConfig,
) -> Result<Report, MeshProbeError> {
    let peers = list_peers(tool.as_ref()).await?;
    let collected = workers::run_probes(tool, peers, config).await?;
    if let Some(shortfall) = collected.shortfall() {
        warn!("{}", shortfall);
    }

    let dispatched = collected.dispatched;
    let completed = collected.completed;
    let mut peers: Vec<EnrichedPeer> = collected
        .outcomes
        .into_iter()
        .map(|(peer, outcome)| EnrichedPeer::new(peer, outcome))
        .collect();
    if !peers.is_empty() && peers.iter().all(|p| p.probe.samples.is_empty()) {
        warn!("No peer answered a ping");
    }

    let lookups = match lookup {
        Some(lookup) if config.enrich => enrich_peers(&mut peers, lookup, config.lookup_delay).await,
        _ => 0,
    };

    let groups = ranking::assign_groups(&mut peers);
    ranking::rank(&mut peers);
    info!("{} peers in {} nat groups", peers.len(), groups.len());

    let summary = RunSummary {
        generated_at: Utc::now(),
        dispatched,
        completed,
        collected: peers.len(),
        lookups,
    };
    Ok(Report {
        peers,
        groups,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{transcript, FakeLookup, FakeMesh, FakePing};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const STATUS: &str = "\
100.64.0.1   laptop     alice@   linux    Self
100.64.0.2   nas        alice@   linux    active; direct 203.0.113.5:41641
100.64.0.3   desktop    alice@   windows  idle
100.64.0.4   pi         bob@     linux    active; direct 192.168.1.20:41641
100.64.0.5   vps        carol@   linux    idle
100.64.0.6   tablet     bob@     android  offline
100.64.0.7   router     carol@   linux    idle
";

    fn config() -> RunConfig {
        RunConfig {
            probe_timeout: Duration::from_secs(5),
            show_progress: false,
            lookup_delay: Duration::ZERO,
            ..RunConfig::default()
        }
    }

    fn mesh() -> FakeMesh {
        FakeMesh::new(STATUS)
            .with_ping("100.64.0.2", FakePing::Reply(transcript(Some("203.0.113.5:41641"), &[40, 44])))
            .with_ping("100.64.0.3", FakePing::Reply(transcript(Some("203.0.113.5:50012"), &[9, 11])))
            .with_ping("100.64.0.4", FakePing::Reply(transcript(Some("192.168.1.20:41641"), &[2])))
            .with_ping("100.64.0.5", FakePing::Reply(transcript(Some("198.51.100.9:41641"), &[70])))
            .with_ping("100.64.0.7", FakePing::Fail)
    }

    fn hostnames(report: &Report) -> Vec<&str> {
        report.peers.iter().map(|p| p.peer.hostname.as_str()).collect()
    }

    #[tokio::test]
    async fn full_run_groups_ranks_and_labels() {
        let lookup = FakeLookup::default()
            .with_isp(Ipv4Addr::new(203, 0, 113, 5), "Example Fiber")
            .with_isp(Ipv4Addr::new(198, 51, 100, 9), "Example Cloud");

        let report = run(Arc::new(mesh()), Some(&lookup as &dyn OrgLookup), &config())
            .await
            .unwrap();

        assert_eq!(hostnames(&report), vec!["desktop", "nas", "vps", "pi", "router"]);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.peers[0].group.unwrap().label(), "A (2)");
        assert_eq!(report.peers[1].group.unwrap().label(), "A (2)");
        assert_eq!(report.peers[2].group.unwrap().label(), "B (1)");
        assert!(report.peers[3].group.is_none());
        assert!(report.peers[4].group.is_none());
        assert!(report.peers[4].probe.samples.is_empty());

        assert_eq!(
            report.peers[0].organization.as_ref().map(|o| o.isp.as_str()),
            Some("Example Fiber")
        );
        assert!(report.peers[3].organization.is_none());
        assert_eq!(report.summary.lookups, 2);
        assert_eq!(lookup.calls(), 2);

        assert_eq!(report.summary.dispatched, 5);
        assert_eq!(report.summary.completed, 5);
        assert_eq!(report.summary.shortfall(), 0);
    }

    #[tokio::test]
    async fn enrichment_can_be_switched_off() {
        let lookup = FakeLookup::default();
        let config = RunConfig {
            enrich: false,
            ..config()
        };
        let report = run(Arc::new(mesh()), Some(&lookup as &dyn OrgLookup), &config)
            .await
            .unwrap();
        assert_eq!(lookup.calls(), 0);
        assert!(report.peers.iter().all(|p| p.organization.is_none()));
        // grouping does not depend on enrichment
        assert_eq!(report.groups.len(), 2);
    }

    #[tokio::test]
    async fn unavailable_tool_aborts_before_probing() {
        let mesh = Arc::new(FakeMesh::unavailable("daemon not running"));
        let err = run(mesh.clone(), None, &config()).await.unwrap_err();
        assert_eq!(err, MeshProbeError::ToolUnavailable("daemon not running".into()));
        assert_eq!(mesh.pings(), 0);
    }

    #[test]
    fn fatal_message_names_the_cause() {
        assert_eq!(
            fatal_message(&MeshProbeError::ToolUnavailable("exit status: 1".into())),
            "Error: tailscale is not installed or not running: exit status: 1"
        );
    }

    #[tokio::test]
    async fn discovery_failure_aborts_before_probing() {
        let mesh = Arc::new(FakeMesh::failing_status("exit status: 1"));
        let err = run(mesh.clone(), None, &config()).await.unwrap_err();
        assert!(matches!(err, MeshProbeError::Discovery(_)));
        assert_eq!(mesh.pings(), 0);
    }

    #[tokio::test]
    async fn empty_directory_is_no_peers() {
        let status = "100.64.0.1 laptop alice@ linux Self\n100.64.0.6 tablet bob@ android offline\n";
        let err = run(Arc::new(FakeMesh::new(status)), None, &config())
            .await
            .unwrap_err();
        assert_eq!(err, MeshProbeError::NoPeers);
    }

    #[tokio::test]
    async fn timeout_yields_partial_report() {
        let status: String = (1..=10)
            .map(|n| format!("100.64.1.{}  host{}  alice@  linux  idle\n", n, n))
            .collect();
        let mut mesh = FakeMesh::new(&status);
        for n in 1..=10u32 {
            let ping = if n > 7 {
                FakePing::Hang
            } else {
                FakePing::Reply(transcript(Some("203.0.113.5:41641"), &[100 - n]))
            };
            mesh = mesh.with_ping(&format!("100.64.1.{}", n), ping);
        }
        let config = RunConfig {
            probe_timeout: Duration::from_millis(300),
            ..config()
        };

        let report = run(Arc::new(mesh), None, &config).await.unwrap();

        assert_eq!(report.peers.len(), 7);
        assert_eq!(report.summary.dispatched, 10);
        assert_eq!(report.summary.shortfall(), 3);
        assert_eq!(report.peers[0].peer.hostname, "host7");
        assert_eq!(report.peers[0].group.unwrap().label(), "A (7)");
    }
}
