//! Per-game event buffer with all-or-nothing commit.

use shakmaty::Square;

use crate::aggregator::Aggregator;
use crate::error::GameError;

/// One attribution waiting for its game to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub attacker: String,
    pub victim: String,
    /// Full-move number minus one; clamped only when committed.
    pub move_index: u32,
    /// Where the victim stood when it died.
    pub square: Option<Square>,
}

/// Lifecycle of the game currently being collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GamePhase {
    Init,
    Skipped,
    Active,
    Invalid(GameError),
}

/// What happened to a game's events at its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Committed { events: usize },
    Discarded { events: usize, reason: GameError },
    Skipped,
}

#[derive(Debug)]
pub struct EventCollector {
    phase: GamePhase,
    events: Vec<PendingEvent>,
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::Init,
            events: Vec::with_capacity(64),
        }
    }

    pub fn phase(&self) -> &GamePhase {
        &self.phase
    }

    pub fn begin(&mut self) {
        self.events.clear();
        self.phase = GamePhase::Active;
    }

    /// Mark the current game as not taking part in the statistics at all.
    pub fn skip(&mut self) {
        self.events.clear();
        self.phase = GamePhase::Skipped;
    }

    pub fn is_active(&self) -> bool {
        self.phase == GamePhase::Active
    }

    /// First failure wins; later ones are ignored.
    pub fn invalidate(&mut self, reason: GameError) {
        if self.is_active() {
            self.phase = GamePhase::Invalid(reason);
        }
    }

    pub fn record(&mut self, event: PendingEvent) {
        if self.is_active() {
            self.events.push(event);
        }
    }

    pub fn pending(&self) -> &[PendingEvent] {
        &self.events
    }

    /// Commit the buffered events if the game is still active, drop them otherwise.
    pub fn finish(&mut self, aggregator: &mut Aggregator) -> Verdict {
        let phase = std::mem::replace(&mut self.phase, GamePhase::Init);
        let events = self.events.len();
        let verdict = match phase {
            GamePhase::Active => {
                for event in &self.events {
                    aggregator.commit(event);
                }
                aggregator.counters.games_committed += 1;
                Verdict::Committed { events }
            }
            GamePhase::Invalid(reason) => {
                aggregator.counters.games_invalid += 1;
                aggregator.counters.events_discarded += events as u64;
                Verdict::Discarded { events, reason }
            }
            GamePhase::Init | GamePhase::Skipped => Verdict::Skipped,
        };
        self.events.clear();
        verdict
    }
}
