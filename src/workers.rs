use crate::config::RunConfig;
use crate::error::MeshProbeError;
use crate::mesh::MeshTool;
use crate::outcome_stream::outcome_stream;
use crate::peers::PeerRecord;
use crate::probe::{probe_peer, ProbeOutcome};
use crate::select_stream_or_deadline::select_stream_or_deadline;
use crate::types::GenericBoxedStream;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::{task, time};
use tracing::{debug, info, trace, warn};

/// Outcomes gathered before every probe reported or the deadline passed.
#[derive(Debug)]
pub struct Collected {
    /// In directory order, not arrival order.
    pub outcomes: Vec<(PeerRecord, ProbeOutcome)>,
    pub dispatched: usize,
    /// Completion counter at the moment collection stopped.
    pub completed: usize,
}

impl Collected {
    pub fn shortfall(&self) -> Option<MeshProbeError> {
        (self.outcomes.len() < self.dispatched).then(|| MeshProbeError::PartialResults {
            completed: self.outcomes.len(),
            total: self.dispatched,
        })
    }
}

/// Counts its probe as complete when dropped, however the task ends.
struct CompletionGuard {
    completed: Arc<AtomicUsize>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Probe every peer at once and collect until all report or the timeout fires.
///
/// Probes still running at the deadline are left to finish on their own;
/// their outcomes are discarded.
pub async fn run_probes(
    tool: Arc<dyn MeshTool>,
    peers: Vec<PeerRecord>,
    config: &RunConfig,
) -> Result<Collected, MeshProbeError> {
    if peers.is_empty() {
        return Err(MeshProbeError::NoPeers);
    }

    let total = peers.len();
    info!("Probing {} peers", total);
    let completed = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::unbounded_channel::<(usize, ProbeOutcome)>();

    for (index, peer) in peers.iter().enumerate() {
        let tool = tool.clone();
        let tx = tx.clone();
        let address = peer.address.clone();
        let count = config.probe_count;
        let guard = CompletionGuard {
            completed: completed.clone(),
        };
        task::spawn(async move {
            let outcome = {
                let _guard = guard;
                probe_peer(tool.as_ref(), &address, count).await
            };
            if tx.send((index, outcome)).is_err() {
                trace!("Collector closed, dropping late outcome for {}", address);
            }
        });
    }
    drop(tx);

    let done = Arc::new(Notify::new());
    let progress = config.show_progress.then(|| {
        task::spawn(report_progress(
            progress_bar(total),
            completed.clone(),
            config.progress_interval,
            done.clone(),
        ))
    });

    let mut stream: GenericBoxedStream<(usize, ProbeOutcome)> = Box::pin(outcome_stream(rx));
    let deadline = time::sleep(config.probe_timeout);
    tokio::pin!(deadline);

    let mut slots: Vec<Option<ProbeOutcome>> = vec![None; total];
    loop {
        match select_stream_or_deadline(stream.as_mut(), deadline.as_mut()).await {
            Ok(Some((index, outcome))) => {
                slots[index] = Some(outcome);
            }
            Ok(None) => {
                debug!("All probes reported");
                break;
            }
            Err(()) => {
                warn!("Probe timeout after {:?}", config.probe_timeout);
                break;
            }
        }
    }
    // Closes the queue; anything sent from here on is dropped.
    drop(stream);
    let completed = completed.load(Ordering::SeqCst);

    done.notify_one();
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    let outcomes: Vec<(PeerRecord, ProbeOutcome)> = peers
        .into_iter()
        .zip(slots)
        .filter_map(|(peer, slot)| slot.map(|outcome| (peer, outcome)))
        .collect();
    info!("Collected {}/{} probe outcomes", outcomes.len(), total);

    Ok(Collected {
        outcomes,
        dispatched: total,
        completed,
    })
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:15.green}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message("Probing peers");
    bar
}

/// Mirror the completion counter into `bar` until `done` fires. Only reads
/// the counter.
async fn report_progress(
    bar: ProgressBar,
    completed: Arc<AtomicUsize>,
    every: Duration,
    done: Arc<Notify>,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                bar.set_position(completed.load(Ordering::Relaxed) as u64);
            }
            _ = done.notified() => {
                bar.set_position(completed.load(Ordering::Relaxed) as u64);
                bar.finish();
                break;
            }
        }
    }
}
