use std::path::PathBuf;
use std::time::Duration;

/// Pings per peer.
pub const PROBE_COUNT: u32 = 5;
/// How long the scheduler waits for all probes before reporting what it has.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// ip-api.com allows 45 requests a minute on the free endpoint.
pub const LOOKUP_DELAY: Duration = Duration::from_millis(100);
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
pub const LOOKUP_ENDPOINT: &str = "http://ip-api.com/json/{ip}";

/// Immutable settings for one run, folded from the command line.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub tool_path: Option<PathBuf>,
    pub probe_count: u32,
    pub probe_timeout: Duration,
    pub progress_interval: Duration,
    pub show_progress: bool,
    pub enrich: bool,
    pub lookup_endpoint: String,
    pub lookup_delay: Duration,
    pub lookup_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tool_path: None,
            probe_count: PROBE_COUNT,
            probe_timeout: PROBE_TIMEOUT,
            progress_interval: PROGRESS_INTERVAL,
            show_progress: true,
            enrich: true,
            lookup_endpoint: LOOKUP_ENDPOINT.to_string(),
            lookup_delay: LOOKUP_DELAY,
            lookup_timeout: LOOKUP_TIMEOUT,
        }
    }
}
