//! Replays one game at a time: rules engine, identity tracker and event
//! collector advance in lockstep for every move.

use chess_core::{classify, GameTask, IdentityTracker, MoveObservation, TrackError};
use shakmaty::{san::SanPlus, Chess, Color, Move, Position};
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::error::GameError;
use crate::events::{EventCollector, PendingEvent, Verdict};

/// Attacker label used for a mate delivered from a square the tracker lost.
pub const UNKNOWN_ATTACKER: &str = "Unknown";

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

/// Owns everything one game replay mutates. A worker keeps one for its lifetime
/// and resets it between games.
pub struct GameProcessor {
    pos: Chess,
    tracker: IdentityTracker,
    collector: EventCollector,
    strict_desync: bool,
    nonstandard: bool,
    ply: usize,
    desyncs: u64,
}

impl GameProcessor {
    pub fn new(strict_desync: bool) -> Self {
        Self {
            pos: Chess::default(),
            tracker: IdentityTracker::new(),
            collector: EventCollector::new(),
            strict_desync,
            nonstandard: false,
            ply: 0,
            desyncs: 0,
        }
    }

    pub fn begin_game(&mut self) {
        self.pos = Chess::default();
        self.tracker.reset();
        self.collector.begin();
        self.nonstandard = false;
        self.ply = 0;
        self.desyncs = 0;
    }

    /// The game does not start from the standard position; it is read but not counted.
    pub fn skip_nonstandard(&mut self) {
        self.collector.skip();
        self.nonstandard = true;
    }

    pub fn is_active(&self) -> bool {
        self.collector.is_active()
    }

    pub fn invalidate(&mut self, reason: GameError) {
        self.collector.invalidate(reason);
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn position(&self) -> &Chess {
        &self.pos
    }

    pub fn pending(&self) -> &[PendingEvent] {
        self.collector.pending()
    }

    /// Resolve and play one SAN token. Returns whether the game is still active.
    pub fn play_san(&mut self, san: &SanPlus) -> bool {
        if !self.is_active() {
            return false;
        }
        self.ply += 1;
        match san.san.to_move(&self.pos) {
            Ok(mv) => self.play(mv),
            Err(err) => self.invalidate(GameError::IllegalMove {
                ply: self.ply,
                san: san.to_string(),
                reason: err.to_string(),
            }),
        }
        self.is_active()
    }

    fn play(&mut self, mv: Move) {
        let move_index = self.pos.fullmoves().get() - 1;

        let Some(obs) = MoveObservation::from_engine(&self.pos, &mv) else {
            self.pos.play_unchecked(mv);
            return;
        };
        let class = classify(&obs);

        match self.tracker.apply(&class) {
            Ok(applied) => {
                if let Some(captured) = applied.captured {
                    self.collector.record(PendingEvent {
                        attacker: applied.attacker,
                        victim: captured.label,
                        move_index,
                        square: Some(captured.square),
                    });
                }
            }
            Err(TrackError::Desync { square }) => {
                self.desyncs += 1;
                debug!(ply = self.ply, %square, "Tracker desync, engine board advanced alone");
                if self.strict_desync {
                    self.invalidate(GameError::Desync { square });
                }
            }
        }

        self.pos.play_unchecked(mv);

        if self.pos.is_checkmate() {
            let loser = self.pos.turn();
            let attacker = self
                .tracker
                .label_of(class.landing())
                .unwrap_or_else(|| UNKNOWN_ATTACKER.to_string());
            self.collector.record(PendingEvent {
                attacker,
                victim: format!("{}_King", color_name(loser)),
                move_index,
                square: self.pos.board().king_of(loser),
            });
        }
    }

    /// Close the current game: commit or discard its events and update counters.
    pub fn finish_game(&mut self, aggregator: &mut Aggregator) -> Verdict {
        if self.nonstandard {
            aggregator.counters.games_nonstandard += 1;
        }
        if self.desyncs > 0 {
            aggregator.counters.desync_moves += self.desyncs;
            aggregator.counters.desync_games += 1;
        }
        self.nonstandard = false;
        self.desyncs = 0;
        self.collector.finish(aggregator)
    }

    /// Replay a whole task and close it.
    pub fn replay(&mut self, task: &GameTask, aggregator: &mut Aggregator) -> Verdict {
        self.begin_game();
        if task.nonstandard {
            self.skip_nonstandard();
        } else if let Some(reason) = &task.malformed {
            self.invalidate(GameError::Malformed(reason.clone()));
        }
        for san in &task.moves {
            if !self.play_san(san) {
                break;
            }
        }
        self.finish_game(aggregator)
    }
}
