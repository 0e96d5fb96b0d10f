//! Drivers that turn a PGN file into committed statistics.
//!
//! Both modes read the source through the same `GameSource`, honour the same
//! checkpoint, and finish by writing one final checkpoint plus the report.

mod parallel;
mod sequential;

use std::fs::File;
use std::io::BufReader;
use std::ops::ControlFlow;

use chess_core::{check_movetext, GameHeaders, GameSource, GameTask, RawGame};
use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::checkpoint::{write_final_report, Checkpoint, CheckpointManager, ResumeMarker};
use crate::config::{KillerConfig, Mode};
use crate::error::KillerError;

pub use parallel::{run_parallel, Progress};
pub use sequential::run_sequential;

/// Outcome of a complete run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub marker: ResumeMarker,
    pub stats: Aggregator,
}

impl RunSummary {
    pub fn games_processed(&self) -> u64 {
        self.marker.games_processed
    }
}

/// Source positioned after everything the checkpoint already accounts for,
/// together with the statistics restored from it.
pub(crate) struct Resumed {
    pub source: GameSource<BufReader<File>>,
    pub stats: Aggregator,
    pub games_processed: u64,
}

pub(crate) fn open_source(config: &KillerConfig, restored: Option<Checkpoint>) -> Result<Resumed, KillerError> {
    let Some(checkpoint) = restored else {
        return Ok(Resumed {
            source: GameSource::open(&config.pgn_path)?,
            stats: Aggregator::new(config.max_move_index),
            games_processed: 0,
        });
    };

    let games = checkpoint.games_processed;
    if let Some(offset) = checkpoint.resume_offset {
        match GameSource::open_at(&config.pgn_path, offset, games) {
            Ok(source) => {
                info!(games, offset, "Resuming at saved byte offset");
                return Ok(Resumed {
                    source,
                    stats: checkpoint.stats,
                    games_processed: games,
                });
            }
            Err(e) => warn!(error = %e, offset, "Saved offset unusable, skipping games instead"),
        }
    }

    let mut source = GameSource::open(&config.pgn_path)?;
    let skipped = source.skip_games(games)?;
    if skipped < games {
        warn!(expected = games, skipped, "Source ends before the checkpoint position");
    }
    info!(games = skipped, "Resuming by skipping already processed games");
    Ok(Resumed {
        source,
        stats: checkpoint.stats,
        games_processed: games,
    })
}

/// Run in the configured mode, then write the final checkpoint and report.
pub async fn run(config: &KillerConfig) -> Result<RunSummary, KillerError> {
    let checkpoints = CheckpointManager::new(config.checkpoint_path(), config.save_interval);
    let restored = if config.fresh {
        info!("Fresh run requested, ignoring any checkpoint");
        None
    } else {
        checkpoints.restore(config.max_move_index)?
    };

    info!(
        pgn = %config.pgn_path.display(),
        mode = ?config.mode,
        max_move_index = config.max_move_index,
        "Starting attribution run"
    );

    let summary = match config.mode {
        Mode::Sequential => {
            let config = config.clone();
            let checkpoints = checkpoints.clone();
            tokio::task::spawn_blocking(move || run_sequential(&config, &checkpoints, restored))
                .await
                .map_err(|e| KillerError::Worker(e.to_string()))??
        }
        Mode::Parallel => run_parallel(config, &checkpoints, restored).await?,
    };

    checkpoints.save_or_log(summary.marker, &summary.stats);
    write_final_report(&config.final_result_path(), &summary.stats, summary.games_processed())?;

    let counters = &summary.stats.counters;
    info!(
        games = summary.games_processed(),
        committed = counters.games_committed,
        invalid = counters.games_invalid,
        nonstandard = counters.games_nonstandard,
        events = counters.events_committed,
        output = %config.final_result_path().display(),
        "Run complete"
    );
    if counters.desync_moves > 0 {
        warn!(
            moves = counters.desync_moves,
            games = counters.desync_games,
            "Identity tracker fell out of step with the board"
        );
    }
    Ok(summary)
}

/// Header tag to `GameHeaders`, shared by every visitor here.
fn record_tag(tags: &mut GameHeaders, name: &[u8], value: RawTag<'_>) {
    tags.set(name, value.decode_utf8_lossy().into_owned());
}

/// Extracts the move list of one game for a replay worker.
struct MoveListVisitor;

impl Visitor for MoveListVisitor {
    type Tags = GameHeaders;
    type Movetext = Vec<SanPlus>;
    type Output = GameTask;

    fn begin_tags(&mut self) -> ControlFlow<GameTask, GameHeaders> {
        ControlFlow::Continue(GameHeaders::default())
    }

    fn tag(&mut self, tags: &mut GameHeaders, name: &[u8], value: RawTag<'_>) -> ControlFlow<GameTask> {
        record_tag(tags, name, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameHeaders) -> ControlFlow<GameTask, Vec<SanPlus>> {
        if !tags.is_standard_start() {
            return ControlFlow::Break(GameTask {
                nonstandard: true,
                ..GameTask::default()
            });
        }
        ControlFlow::Continue(Vec::with_capacity(96))
    }

    fn begin_variation(&mut self, _moves: &mut Vec<SanPlus>) -> ControlFlow<GameTask, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, moves: &mut Vec<SanPlus>, san_plus: SanPlus) -> ControlFlow<GameTask> {
        moves.push(san_plus);
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, moves: Vec<SanPlus>) -> GameTask {
        GameTask {
            moves,
            ..GameTask::default()
        }
    }
}

/// Tokenize one raw game into a task. Anything the reader chokes on becomes a
/// malformed task rather than an error: the game is discarded, the run goes on.
pub(crate) fn extract_task(raw: &RawGame) -> GameTask {
    let mut reader = Reader::new(raw.text.as_bytes());
    let mut task = match reader.read_game(&mut MoveListVisitor) {
        Ok(Some(task)) => task,
        Ok(None) => GameTask {
            malformed: Some("no game in chunk".to_string()),
            ..GameTask::default()
        },
        Err(e) => GameTask {
            malformed: Some(e.to_string()),
            ..GameTask::default()
        },
    };
    if !task.nonstandard && task.malformed.is_none() {
        if let Err(e) = check_movetext(&raw.text) {
            task.malformed = Some(e.to_string());
        }
    }
    task.index = raw.index;
    task
}
