//! Kill matrix and death timeline.
//!
//! One `Aggregator` per owner: the sequential driver has one, every parallel
//! worker has its own, and partial aggregators are combined with `merge`.
//! Merging is element-wise addition, so the combination order never matters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::PendingEvent;

/// Counts indexed by move bucket (or by square for `death_squares`).
pub type Histogram = Vec<u64>;

const BOARD_SQUARES: usize = 64;

/// Run metadata, summed like the histograms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub games_committed: u64,
    pub games_invalid: u64,
    pub games_nonstandard: u64,
    pub events_committed: u64,
    pub events_discarded: u64,
    pub desync_moves: u64,
    pub desync_games: u64,
}

impl RunCounters {
    pub fn merge(&mut self, other: &RunCounters) {
        self.games_committed += other.games_committed;
        self.games_invalid += other.games_invalid;
        self.games_nonstandard += other.games_nonstandard;
        self.events_committed += other.events_committed;
        self.events_discarded += other.events_discarded;
        self.desync_moves += other.desync_moves;
        self.desync_games += other.desync_games;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregator {
    pub max_move_index: usize,
    /// attacker label -> victim label -> deaths per move bucket
    pub kill_matrix: BTreeMap<String, BTreeMap<String, Histogram>>,
    /// victim label -> deaths per move bucket
    pub death_timeline: BTreeMap<String, Histogram>,
    /// victim label -> deaths per square (a1 = 0, h8 = 63)
    #[serde(default)]
    pub death_squares: BTreeMap<String, Histogram>,
    #[serde(default)]
    pub counters: RunCounters,
}

fn bump(histogram: &mut Histogram, width: usize, index: usize) {
    if histogram.len() < width {
        histogram.resize(width, 0);
    }
    histogram[index.min(width - 1)] += 1;
}

/// Add `src` into `dst`; buckets past `dst`'s ceiling fold into its last bucket.
fn add_into(dst: &mut Histogram, src: &[u64], width: usize) {
    if dst.len() < width {
        dst.resize(width, 0);
    }
    for (i, count) in src.iter().enumerate() {
        dst[i.min(width - 1)] += count;
    }
}

impl Aggregator {
    pub fn new(max_move_index: usize) -> Self {
        Self {
            max_move_index,
            kill_matrix: BTreeMap::new(),
            death_timeline: BTreeMap::new(),
            death_squares: BTreeMap::new(),
            counters: RunCounters::default(),
        }
    }

    fn width(&self) -> usize {
        self.max_move_index + 1
    }

    /// Clamp a move index into `[0, max_move_index]`.
    pub fn bucket(&self, move_index: u32) -> usize {
        (move_index as usize).min(self.max_move_index)
    }

    pub fn commit(&mut self, event: &PendingEvent) {
        let width = self.width();
        let bucket = self.bucket(event.move_index);

        let kills = self
            .kill_matrix
            .entry(event.attacker.clone())
            .or_default()
            .entry(event.victim.clone())
            .or_insert_with(|| vec![0; width]);
        bump(kills, width, bucket);

        let deaths = self
            .death_timeline
            .entry(event.victim.clone())
            .or_insert_with(|| vec![0; width]);
        bump(deaths, width, bucket);

        if let Some(square) = event.square {
            let squares = self
                .death_squares
                .entry(event.victim.clone())
                .or_insert_with(|| vec![0; BOARD_SQUARES]);
            bump(squares, BOARD_SQUARES, usize::from(square));
        }

        self.counters.events_committed += 1;
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: Aggregator) {
        let width = self.width();

        for (attacker, victims) in other.kill_matrix {
            let row = self.kill_matrix.entry(attacker).or_default();
            for (victim, counts) in victims {
                add_into(row.entry(victim).or_default(), &counts, width);
            }
        }
        for (victim, counts) in other.death_timeline {
            add_into(self.death_timeline.entry(victim).or_default(), &counts, width);
        }
        for (victim, counts) in other.death_squares {
            add_into(self.death_squares.entry(victim).or_default(), &counts, BOARD_SQUARES);
        }
        self.counters.merge(&other.counters);
    }

    /// Hand out everything accumulated so far, leaving an empty aggregator behind.
    pub fn take(&mut self) -> Aggregator {
        std::mem::replace(self, Aggregator::new(self.max_move_index))
    }

    pub fn kills(&self, attacker: &str, victim: &str) -> Option<&Histogram> {
        self.kill_matrix.get(attacker)?.get(victim)
    }

    pub fn total_kills(&self) -> u64 {
        self.death_timeline.values().flatten().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.kill_matrix.is_empty() && self.counters == RunCounters::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Square;

    fn event(attacker: &str, victim: &str, move_index: u32) -> PendingEvent {
        PendingEvent {
            attacker: attacker.to_string(),
            victim: victim.to_string(),
            move_index,
            square: Some(Square::D5),
        }
    }

    #[test]
    fn test_commit_allocates_lazily() {
        let mut agg = Aggregator::new(10);
        assert!(agg.is_empty());
        agg.commit(&event("White_Pawn_e", "Black_Pawn_d", 1));

        let kills = agg.kills("White_Pawn_e", "Black_Pawn_d").unwrap();
        assert_eq!(kills.len(), 11);
        assert_eq!(kills[1], 1);
        assert_eq!(agg.death_timeline["Black_Pawn_d"][1], 1);
        assert_eq!(agg.death_squares["Black_Pawn_d"][usize::from(Square::D5)], 1);
        assert_eq!(agg.counters.events_committed, 1);
        assert_eq!(agg.kills("White_Pawn_e", "Black_Queen"), None);
    }

    #[test]
    fn test_move_index_beyond_ceiling_lands_in_last_bucket() {
        let mut agg = Aggregator::new(5);
        agg.commit(&event("White_Queen", "Black_Rook_a", 5));
        agg.commit(&event("White_Queen", "Black_Rook_a", 400));
        let kills = agg.kills("White_Queen", "Black_Rook_a").unwrap();
        assert_eq!(kills.len(), 6);
        assert_eq!(kills[5], 2);
    }

    #[test]
    fn test_zero_ceiling_has_single_bucket() {
        let mut agg = Aggregator::new(0);
        agg.commit(&event("White_Queen", "Black_Rook_a", 0));
        agg.commit(&event("White_Queen", "Black_Rook_a", 9));
        assert_eq!(agg.death_timeline["Black_Rook_a"], vec![2]);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut a = Aggregator::new(8);
        a.commit(&event("White_Pawn_e", "Black_Pawn_d", 1));
        a.commit(&event("Black_Queen", "White_Pawn_e", 2));
        a.counters.games_committed = 1;

        let mut b = Aggregator::new(8);
        b.commit(&event("White_Pawn_e", "Black_Pawn_d", 3));
        b.commit(&event("White_Knight_g", "Black_Bishop_c", 20));
        b.counters.games_invalid = 2;

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b.clone();
        ba.merge(a.clone());
        assert_eq!(ab, ba);

        let mut single = Aggregator::new(8);
        for e in [
            event("White_Pawn_e", "Black_Pawn_d", 1),
            event("Black_Queen", "White_Pawn_e", 2),
            event("White_Pawn_e", "Black_Pawn_d", 3),
            event("White_Knight_g", "Black_Bishop_c", 20),
        ] {
            single.commit(&e);
        }
        single.counters.games_committed = 1;
        single.counters.games_invalid = 2;
        assert_eq!(ab, single);
    }

    #[test]
    fn test_merge_into_empty_and_take() {
        let mut a = Aggregator::new(4);
        a.commit(&event("White_Pawn_e", "Black_Pawn_d", 1));
        let mut total = Aggregator::new(4);
        total.merge(a.take());
        assert!(a.is_empty());
        assert_eq!(total.total_kills(), 1);
        assert_eq!(total.kills("White_Pawn_e", "Black_Pawn_d").unwrap()[1], 1);
    }
}
