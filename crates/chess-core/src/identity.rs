//! Per-game identity map: which original piece stands on which square.
//!
//! Labels are handed out once from the standard initial position and follow
//! the piece for the rest of the game. A promoted pawn keeps its pawn label
//! and only gains the `promoted` flag.

use shakmaty::{Board, CastlingSide, Color, File, Rank, Square};

use crate::classify::{Classification, MoveKind};
use crate::error::TrackError;

const WHITE_BACK_RANK: [&str; 8] = [
    "White_Rook_a",
    "White_Knight_b",
    "White_Bishop_c",
    "White_Queen",
    "White_King",
    "White_Bishop_f",
    "White_Knight_g",
    "White_Rook_h",
];

const WHITE_PAWNS: [&str; 8] = [
    "White_Pawn_a",
    "White_Pawn_b",
    "White_Pawn_c",
    "White_Pawn_d",
    "White_Pawn_e",
    "White_Pawn_f",
    "White_Pawn_g",
    "White_Pawn_h",
];

const BLACK_BACK_RANK: [&str; 8] = [
    "Black_Rook_a",
    "Black_Knight_b",
    "Black_Bishop_c",
    "Black_Queen",
    "Black_King",
    "Black_Bishop_f",
    "Black_Knight_g",
    "Black_Rook_h",
];

const BLACK_PAWNS: [&str; 8] = [
    "Black_Pawn_a",
    "Black_Pawn_b",
    "Black_Pawn_c",
    "Black_Pawn_d",
    "Black_Pawn_e",
    "Black_Pawn_f",
    "Black_Pawn_g",
    "Black_Pawn_h",
];

const PROMOTED_SUFFIX: &str = "_promoted";

/// Identity of the piece on one square. `active == false` means the square is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PieceIdentity {
    pub label: &'static str,
    pub promoted: bool,
    pub active: bool,
}

impl PieceIdentity {
    pub const EMPTY: PieceIdentity = PieceIdentity {
        label: "",
        promoted: false,
        active: false,
    };

    fn new(label: &'static str) -> Self {
        Self {
            label,
            promoted: false,
            active: true,
        }
    }

    /// Externally visible id: the label, plus `_promoted` once promoted.
    /// `None` for an empty square.
    pub fn full_label(&self) -> Option<String> {
        if !self.active {
            return None;
        }
        if self.promoted {
            Some(format!("{}{}", self.label, PROMOTED_SUFFIX))
        } else {
            Some(self.label.to_string())
        }
    }
}

/// A piece removed from the board by a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPiece {
    pub label: String,
    pub square: Square,
}

/// What the tracker did for one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// Full label of the mover as it was before the move (pre-promotion).
    pub attacker: String,
    pub captured: Option<CapturedPiece>,
    /// Square the mover now occupies.
    pub landing: Square,
}

/// Board of 64 identity slots, owned by exactly one game replay.
#[derive(Debug, Clone)]
pub struct IdentityTracker {
    slots: [PieceIdentity; 64],
}

impl Default for IdentityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityTracker {
    pub fn new() -> Self {
        let mut tracker = Self {
            slots: [PieceIdentity::EMPTY; 64],
        };
        tracker.reset();
        tracker
    }

    /// Restore the standard 32-piece labeling.
    pub fn reset(&mut self) {
        self.slots = [PieceIdentity::EMPTY; 64];
        for file in 0..8u32 {
            let f = File::new(file);
            let i = file as usize;
            self.put(Square::from_coords(f, Rank::First), WHITE_BACK_RANK[i]);
            self.put(Square::from_coords(f, Rank::Second), WHITE_PAWNS[i]);
            self.put(Square::from_coords(f, Rank::Seventh), BLACK_PAWNS[i]);
            self.put(Square::from_coords(f, Rank::Eighth), BLACK_BACK_RANK[i]);
        }
    }

    fn put(&mut self, sq: Square, label: &'static str) {
        self.slots[usize::from(sq)] = PieceIdentity::new(label);
    }

    pub fn get(&self, sq: Square) -> PieceIdentity {
        self.slots[usize::from(sq)]
    }

    /// Full label of the piece on `sq`, or `None` if the square is empty.
    pub fn label_of(&self, sq: Square) -> Option<String> {
        self.get(sq).full_label()
    }

    pub fn is_active(&self, sq: Square) -> bool {
        self.get(sq).active
    }

    /// Forget whatever is tracked on `sq`.
    pub fn clear(&mut self, sq: Square) {
        self.slots[usize::from(sq)] = PieceIdentity::EMPTY;
    }

    /// Move the identity on `from` to `to`, clearing `from`.
    /// The identity is copied out before the source slot is cleared.
    fn relocate(&mut self, from: Square, to: Square) {
        let moving = self.get(from);
        self.slots[usize::from(from)] = PieceIdentity::EMPTY;
        self.slots[usize::from(to)] = moving;
    }

    /// Update the map for a classified move, before the engine plays it.
    ///
    /// On desync (nothing tracked on the source square) the map is left
    /// untouched and the caller decides what to do with the game.
    pub fn apply(&mut self, mv: &Classification) -> Result<AppliedMove, TrackError> {
        let mut mover = self.get(mv.from);
        let attacker = mover
            .full_label()
            .ok_or(TrackError::Desync { square: mv.from })?;

        let captured = mv.victim_square().and_then(|sq| {
            let victim = self.get(sq);
            let label = victim.full_label()?;
            self.slots[usize::from(sq)] = PieceIdentity::EMPTY;
            Some(CapturedPiece { label, square: sq })
        });

        let landing = mv.landing();
        if let Some(side) = mv.castling_side() {
            let back_rank = match mv.turn {
                Color::White => Rank::First,
                Color::Black => Rank::Eighth,
            };
            let rook_file = match side {
                CastlingSide::KingSide => File::H,
                CastlingSide::QueenSide => File::A,
            };
            let rook_from = Square::from_coords(rook_file, back_rank);
            if self.is_active(rook_from) {
                self.relocate(rook_from, side.rook_to(mv.turn));
            }
        }

        self.slots[usize::from(mv.from)] = PieceIdentity::EMPTY;
        if mv.is(MoveKind::Promotion) {
            mover.promoted = true;
        }
        self.slots[usize::from(landing)] = mover;

        Ok(AppliedMove {
            attacker,
            captured,
            landing,
        })
    }

    /// Squares that currently hold a tracked identity.
    pub fn active_squares(&self) -> impl Iterator<Item = Square> + '_ {
        (0..64u32)
            .map(Square::new)
            .filter(|sq| self.is_active(*sq))
    }

    /// True when tracked occupancy equals the engine board's occupancy.
    pub fn matches_board(&self, board: &Board) -> bool {
        let occupied = board.occupied();
        (0..64u32)
            .map(Square::new)
            .all(|sq| self.is_active(sq) == occupied.contains(sq))
    }
}
