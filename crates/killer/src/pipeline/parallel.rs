//! One reader, a pool of replay workers, one merge at the end.
//!
//! The reader splits the source into raw games, tokenizes each into a
//! `GameTask` and pushes it onto a bounded queue; a full queue blocks the
//! reader. Every worker owns a `GameProcessor` and a private `Aggregator`, so
//! replay never shares mutable state. Checkpoints use barrier jobs: the reader
//! queues one barrier per worker after the game that makes a checkpoint due,
//! each worker hands over its partial statistics on its barrier and waits
//! until all of them did, and the checkpoint writer merges the deltas.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chess_core::{GameSource, GameTask};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{extract_task, open_source, RunSummary};
use crate::aggregator::Aggregator;
use crate::checkpoint::{Checkpoint, CheckpointManager, ResumeMarker};
use crate::config::{KillerConfig, MAX_WORKERS};
use crate::error::KillerError;
use crate::processor::GameProcessor;

const MONITOR_PERIOD: Duration = Duration::from_secs(1);

enum Job {
    Game(GameTask),
    Barrier { epoch: u64 },
}

/// Partial statistics handed over by one worker at a barrier.
struct Delta {
    epoch: u64,
    stats: Aggregator,
}

/// Checkpoint announced by the reader ahead of its barrier jobs.
struct Epoch {
    epoch: u64,
    marker: ResumeMarker,
}

/// Counters shared by the reader, the workers and the monitor.
#[derive(Debug, Default)]
pub struct Progress {
    games_read: AtomicU64,
    games_replayed: AtomicU64,
}

impl Progress {
    pub fn games_read(&self) -> u64 {
        self.games_read.load(Ordering::Relaxed)
    }

    pub fn games_replayed(&self) -> u64 {
        self.games_replayed.load(Ordering::Relaxed)
    }

    /// Games read but not yet replayed.
    pub fn in_flight(&self) -> u64 {
        self.games_read().saturating_sub(self.games_replayed())
    }
}

fn join_error(e: tokio::task::JoinError) -> KillerError {
    KillerError::Worker(e.to_string())
}

/// Process the whole source with `config.workers` replay threads.
pub async fn run_parallel(
    config: &KillerConfig,
    checkpoints: &CheckpointManager,
    restored: Option<Checkpoint>,
) -> Result<RunSummary, KillerError> {
    let resumed = open_source(config, restored)?;
    let workers = config.workers.clamp(1, MAX_WORKERS);
    let first_game = resumed.games_processed;

    let (job_tx, job_rx) = mpsc::channel::<Job>(config.queue_capacity.max(1));
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (delta_tx, delta_rx) = mpsc::unbounded_channel::<Delta>();
    let (epoch_tx, epoch_rx) = mpsc::unbounded_channel::<Epoch>();
    let barrier = Arc::new(Barrier::new(workers));
    let progress = Arc::new(Progress::default());

    info!(workers, queue = config.queue_capacity, "Starting replay workers");

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let jobs = job_rx.clone();
        let deltas = delta_tx.clone();
        let barrier = barrier.clone();
        let progress = progress.clone();
        let strict = config.strict_desync;
        let max_move_index = config.max_move_index;
        handles.push(tokio::task::spawn_blocking(move || {
            replay_worker(id, jobs, deltas, barrier, progress, strict, max_move_index)
        }));
    }
    drop(delta_tx);
    drop(job_rx);

    let writer = {
        let checkpoints = checkpoints.clone();
        let restored_stats = resumed.stats;
        tokio::task::spawn_blocking(move || checkpoint_writer(checkpoints, restored_stats, delta_rx, epoch_rx, workers))
    };

    let monitor = tokio::spawn(monitor(progress.clone(), first_game));

    let reader = {
        let progress = progress.clone();
        let interval = checkpoints.interval();
        let source = resumed.source;
        tokio::task::spawn_blocking(move || dispatch(source, job_tx, epoch_tx, progress, interval, workers))
    };

    // Workers drain the queue once the reader drops its sender, error or not.
    let read_result = reader.await.map_err(join_error)?;

    let mut locals = Vec::with_capacity(workers);
    for handle in handles {
        locals.push(handle.await.map_err(join_error)?);
    }
    let mut stats = writer.await.map_err(join_error)?;
    monitor.abort();

    let marker = read_result?;
    for local in locals {
        stats.merge(local);
    }
    debug!(
        read = progress.games_read(),
        replayed = progress.games_replayed(),
        "Replay workers finished"
    );

    Ok(RunSummary { marker, stats })
}

/// Reader loop. Blocking; returns where the source ended.
fn dispatch(
    mut source: GameSource<BufReader<File>>,
    jobs: mpsc::Sender<Job>,
    epochs: mpsc::UnboundedSender<Epoch>,
    progress: Arc<Progress>,
    interval: u64,
    workers: usize,
) -> Result<ResumeMarker, KillerError> {
    let stopped = || KillerError::Worker("replay workers stopped".to_string());
    let mut epoch = 0u64;

    while let Some(raw) = source.next_game()? {
        let task = extract_task(&raw);
        jobs.blocking_send(Job::Game(task)).map_err(|_| stopped())?;
        progress.games_read.fetch_add(1, Ordering::Relaxed);

        let games_processed = raw.index + 1;
        if games_processed % interval == 0 {
            epoch += 1;
            let marker = ResumeMarker {
                games_processed,
                resume_offset: Some(raw.end_offset),
            };
            epochs.send(Epoch { epoch, marker }).map_err(|_| stopped())?;
            for _ in 0..workers {
                jobs.blocking_send(Job::Barrier { epoch }).map_err(|_| stopped())?;
            }
        }
    }

    Ok(ResumeMarker {
        games_processed: source.next_index(),
        resume_offset: Some(source.position()),
    })
}

fn replay_worker(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    deltas: mpsc::UnboundedSender<Delta>,
    barrier: Arc<Barrier>,
    progress: Arc<Progress>,
    strict_desync: bool,
    max_move_index: usize,
) -> Aggregator {
    let mut processor = GameProcessor::new(strict_desync);
    let mut local = Aggregator::new(max_move_index);

    loop {
        // The lock is only held while waiting for the next job.
        let job = jobs.lock().unwrap_or_else(PoisonError::into_inner).blocking_recv();
        match job {
            Some(Job::Game(task)) => {
                processor.replay(&task, &mut local);
                progress.games_replayed.fetch_add(1, Ordering::Relaxed);
            }
            Some(Job::Barrier { epoch }) => {
                let stats = local.take();
                if deltas.send(Delta { epoch, stats }).is_err() {
                    warn!(worker = id, epoch, "Checkpoint writer gone, delta dropped");
                }
                barrier.wait();
            }
            None => break,
        }
    }

    debug!(worker = id, "Queue closed, worker done");
    local
}

/// Merges worker deltas into the running total and saves once every worker
/// reported for an epoch. Returns the total when all workers are gone.
fn checkpoint_writer(
    checkpoints: CheckpointManager,
    mut total: Aggregator,
    mut deltas: mpsc::UnboundedReceiver<Delta>,
    mut epochs: mpsc::UnboundedReceiver<Epoch>,
    workers: usize,
) -> Aggregator {
    let mut reported = 0;
    while let Some(delta) = deltas.blocking_recv() {
        total.merge(delta.stats);
        reported += 1;
        if reported < workers {
            continue;
        }
        reported = 0;
        match epochs.blocking_recv() {
            Some(epoch) => {
                debug_assert_eq!(epoch.epoch, delta.epoch);
                checkpoints.save_or_log(epoch.marker, &total);
            }
            None => warn!(epoch = delta.epoch, "Barrier without checkpoint marker, not saved"),
        }
    }
    total
}

async fn monitor(progress: Arc<Progress>, first_game: u64) {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(MONITOR_PERIOD);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let replayed = progress.games_replayed();
        let rate = replayed as f64 / start.elapsed().as_secs_f64().max(f64::EPSILON);
        info!(
            games = first_game + replayed,
            read = first_game + progress.games_read(),
            queued = progress.in_flight(),
            rate = format!("{rate:.0}/s"),
            "Progress"
        );
    }
}
