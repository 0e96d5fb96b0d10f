//! Single-threaded driver: the visitor feeds every SAN token straight into the
//! processor, so nothing but the current game is ever held in memory.

use std::ops::ControlFlow;
use std::time::Instant;

use chess_core::{check_movetext, GameHeaders, RawGame};
use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use tracing::{debug, info};

use super::{open_source, record_tag, RunSummary};
use crate::aggregator::Aggregator;
use crate::checkpoint::{Checkpoint, CheckpointManager, ResumeMarker};
use crate::config::KillerConfig;
use crate::error::{GameError, KillerError};
use crate::events::Verdict;
use crate::processor::GameProcessor;

/// Replays a game while pgn-reader walks it.
struct ReplayVisitor<'a> {
    processor: &'a mut GameProcessor,
    stats: &'a mut Aggregator,
    /// Set when the movetext holds a token pgn-reader would silently drop.
    malformed: Option<String>,
}

impl Visitor for ReplayVisitor<'_> {
    type Tags = GameHeaders;
    type Movetext = ();
    type Output = Verdict;

    fn begin_tags(&mut self) -> ControlFlow<Verdict, GameHeaders> {
        ControlFlow::Continue(GameHeaders::default())
    }

    fn tag(&mut self, tags: &mut GameHeaders, name: &[u8], value: RawTag<'_>) -> ControlFlow<Verdict> {
        record_tag(tags, name, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameHeaders) -> ControlFlow<Verdict, ()> {
        self.processor.begin_game();
        if !tags.is_standard_start() {
            self.processor.skip_nonstandard();
            return ControlFlow::Break(self.processor.finish_game(self.stats));
        }
        if let Some(reason) = self.malformed.take() {
            self.processor.invalidate(GameError::Malformed(reason));
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _movetext: &mut ()) -> ControlFlow<Verdict, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, _movetext: &mut (), san_plus: SanPlus) -> ControlFlow<Verdict> {
        // An inactive game ignores the rest of its moves.
        self.processor.play_san(&san_plus);
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, _movetext: ()) -> Verdict {
        self.processor.finish_game(self.stats)
    }
}

/// Close a game the reader could not walk to the end.
fn discard_malformed(processor: &mut GameProcessor, stats: &mut Aggregator, reason: String) -> Verdict {
    if !processor.is_active() {
        processor.begin_game();
    }
    processor.invalidate(GameError::Malformed(reason));
    processor.finish_game(stats)
}

fn replay_raw(processor: &mut GameProcessor, stats: &mut Aggregator, raw: &RawGame) -> Verdict {
    let mut reader = Reader::new(raw.text.as_bytes());
    let mut visitor = ReplayVisitor {
        processor: &mut *processor,
        stats: &mut *stats,
        malformed: check_movetext(&raw.text).err().map(|e| e.to_string()),
    };
    match reader.read_game(&mut visitor) {
        Ok(Some(verdict)) => verdict,
        Ok(None) => discard_malformed(processor, stats, "no game in chunk".to_string()),
        Err(e) => discard_malformed(processor, stats, e.to_string()),
    }
}

/// Process the whole source on the calling thread. Blocking.
pub fn run_sequential(
    config: &KillerConfig,
    checkpoints: &CheckpointManager,
    restored: Option<Checkpoint>,
) -> Result<RunSummary, KillerError> {
    let resumed = open_source(config, restored)?;
    let mut source = resumed.source;
    let mut stats = resumed.stats;
    let mut games_processed = resumed.games_processed;
    let first_game = games_processed;

    let mut processor = GameProcessor::new(config.strict_desync);
    let progress_interval = config.progress_interval.max(1);
    let start = Instant::now();

    while let Some(raw) = source.next_game()? {
        let verdict = replay_raw(&mut processor, &mut stats, &raw);
        if let Verdict::Discarded { events, reason } = &verdict {
            debug!(game = raw.index, events, %reason, "Game discarded");
        }
        games_processed += 1;

        if games_processed % progress_interval == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let rate = (games_processed - first_game) as f64 / elapsed.max(f64::EPSILON);
            info!(
                games = games_processed,
                events = stats.counters.events_committed,
                rate = format!("{rate:.0}/s"),
                "Progress"
            );
        }

        if checkpoints.is_due(games_processed) {
            let marker = ResumeMarker {
                games_processed,
                resume_offset: Some(raw.end_offset),
            };
            checkpoints.save_or_log(marker, &stats);
        }
    }

    Ok(RunSummary {
        marker: ResumeMarker {
            games_processed,
            resume_offset: Some(source.position()),
        },
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawGame {
        RawGame {
            index: 0,
            start_offset: 0,
            end_offset: text.len() as u64,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_replay_raw_commits_game() {
        let mut processor = GameProcessor::new(false);
        let mut stats = Aggregator::new(75);
        let verdict = replay_raw(&mut processor, &mut stats, &raw("[White \"a\"]\n\n1. e4 d5 2. exd5 1-0\n"));
        assert_eq!(verdict, Verdict::Committed { events: 1 });
        assert_eq!(stats.kills("White_Pawn_e", "Black_Pawn_d").unwrap()[1], 1);
    }

    #[test]
    fn test_replay_raw_skips_custom_start() {
        let mut processor = GameProcessor::new(false);
        let mut stats = Aggregator::new(75);
        let text = "[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/8/4K2R w K - 0 1\"]\n\n1. Rh8# 1-0\n";
        assert_eq!(replay_raw(&mut processor, &mut stats, &raw(text)), Verdict::Skipped);
        assert_eq!(stats.counters.games_nonstandard, 1);
        assert_eq!(stats.total_kills(), 0);
    }

    #[test]
    fn test_replay_raw_ignores_variations() {
        let mut processor = GameProcessor::new(false);
        let mut stats = Aggregator::new(75);
        let verdict = replay_raw(&mut processor, &mut stats, &raw("1. e4 d5 (1... e5 2. Nf3) 2. exd5 1-0\n"));
        assert_eq!(verdict, Verdict::Committed { events: 1 });
        assert_eq!(stats.kills("White_Pawn_e", "Black_Pawn_d").unwrap()[1], 1);
    }

    #[test]
    fn test_replay_raw_discards_garbled_token() {
        let mut processor = GameProcessor::new(false);
        let mut stats = Aggregator::new(75);
        let verdict = replay_raw(&mut processor, &mut stats, &raw("1. e4 d5 2. exd5 Zz9 1-0\n"));
        match verdict {
            Verdict::Discarded { events, reason } => {
                assert_eq!(events, 0);
                assert!(matches!(reason, GameError::Malformed(_)));
            }
            other => panic!("unexpected verdict {other:?}"),
        }
        assert_eq!(stats.total_kills(), 0);
        assert_eq!(stats.counters.games_invalid, 1);
        assert_eq!(stats.counters.games_committed, 0);
    }

    #[test]
    fn test_replay_raw_discards_illegal_game() {
        let mut processor = GameProcessor::new(false);
        let mut stats = Aggregator::new(75);
        let verdict = replay_raw(&mut processor, &mut stats, &raw("1. e4 d5 2. exd5 Qxd5 3. Ke3 Qe4 *\n"));
        assert!(matches!(verdict, Verdict::Discarded { events: 2, .. }));
        assert_eq!(stats.total_kills(), 0);
        assert_eq!(stats.counters.games_invalid, 1);
    }
}
