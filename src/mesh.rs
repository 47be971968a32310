use crate::error::MeshProbeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, trace};

/// The process boundary to the mesh tool.
///
/// Everything the run needs from the outside world goes through these three
/// calls, so tests can hand in literal transcripts instead of spawning
/// processes.
#[async_trait]
pub trait MeshTool: Send + Sync {
    /// Succeeds when the tool is installed and its daemon answers.
    async fn version(&self) -> Result<String, MeshProbeError>;

    /// Raw `status` output, one peer per line.
    async fn status(&self) -> Result<String, MeshProbeError>;

    /// Combined stdout and stderr of a fixed-count ping to `address`.
    async fn ping(&self, address: &str, count: u32) -> Result<String, MeshProbeError>;
}

/// Drives the `tailscale` command line client.
#[derive(Clone, Debug)]
pub struct TailscaleCli {
    binary: PathBuf,
}

impl TailscaleCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Use `binary` when given, otherwise the platform's install location.
    pub fn for_host(binary: Option<PathBuf>) -> Result<Self, MeshProbeError> {
        if let Some(binary) = binary {
            return Ok(Self::new(binary));
        }
        default_binary(std::env::consts::OS)
            .map(Self::new)
            .ok_or_else(|| {
                MeshProbeError::ToolUnavailable(format!(
                    "unsupported OS: {}",
                    std::env::consts::OS
                ))
            })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, args: &[&str]) -> std::io::Result<Output> {
        trace!("exec {} {}", self.binary.display(), args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

pub fn default_binary(os: &str) -> Option<&'static str> {
    match os {
        "windows" => Some(r"C:\Program Files\Tailscale\tailscale.exe"),
        "linux" => Some("tailscale"),
        "macos" => Some("/Applications/Tailscale.app/Contents/MacOS/tailscale"),
        _ => None,
    }
}

/// Stdout followed by stderr.
///
/// The two pipes are read separately, so lines are not interleaved in write
/// order. `tailscale ping` writes every pong (and so every `via` marker) to
/// stdout and only diagnostics to stderr, which keeps the last egress on
/// stdout the last one in the combined text.
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    if !combined.is_empty() && !combined.ends_with('\n') && !stderr.is_empty() {
        combined.push('\n');
    }
    combined.push_str(&String::from_utf8_lossy(stderr));
    combined
}

fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    match stderr.trim() {
        "" => output.status.to_string(),
        text => format!("{}: {}", output.status, text),
    }
}

#[async_trait]
impl MeshTool for TailscaleCli {
    async fn version(&self) -> Result<String, MeshProbeError> {
        let output = self
            .run(&["version"])
            .await
            .map_err(|e| MeshProbeError::ToolUnavailable(e.to_string()))?;
        if !output.status.success() {
            return Err(MeshProbeError::ToolUnavailable(failure_reason(&output)));
        }
        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        debug!("tailscale version {}", version);
        Ok(version)
    }

    async fn status(&self) -> Result<String, MeshProbeError> {
        let output = self
            .run(&["status"])
            .await
            .map_err(|e| MeshProbeError::Discovery(e.to_string()))?;
        if !output.status.success() {
            return Err(MeshProbeError::Discovery(failure_reason(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn ping(&self, address: &str, count: u32) -> Result<String, MeshProbeError> {
        let count = count.to_string();
        let output = self
            .run(&["ping", "--until-direct=false", "-c", count.as_str(), address])
            .await
            .map_err(|e| MeshProbeError::ProbeFailure {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(MeshProbeError::ProbeFailure {
                address: address.to_string(),
                reason: output.status.to_string(),
            });
        }
        Ok(combine_output(&output.stdout, &output.stderr))
    }
}
