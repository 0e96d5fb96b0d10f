//! Move classification that does not depend on the engine's move encoding.
//!
//! The engine's structured move is treated as a hint. Every category can also
//! be re-derived from board occupancy and move geometry alone, and the final
//! classification is the union of both.

use shakmaty::{CastlingSide, Chess, Color, Move, Piece, Position, Rank, Role, Square};

/// One category a move can belong to. Categories are not exclusive:
/// a promoting capture is both `Capture` and `Promotion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Normal,
    Capture,
    EnPassant,
    Castle,
    Promotion,
}

impl MoveKind {
    const ALL: [MoveKind; 5] = [
        MoveKind::Normal,
        MoveKind::Capture,
        MoveKind::EnPassant,
        MoveKind::Castle,
        MoveKind::Promotion,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Small set of `MoveKind`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveKinds(u8);

impl MoveKinds {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, kind: MoveKind) -> Self {
        self.insert(kind);
        self
    }

    pub fn insert(&mut self, kind: MoveKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(&self, kind: MoveKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MoveKind> + '_ {
        MoveKind::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

/// Everything the classifier is allowed to look at.
#[derive(Debug, Clone, Copy)]
pub struct MoveObservation {
    pub from: Square,
    pub to: Square,
    pub role: Role,
    /// Categories the rules engine claims for this move (may be empty or incomplete).
    pub hints: MoveKinds,
    pub turn: Color,
    /// Piece standing on `to` before the move.
    pub destination: Option<Piece>,
}

impl MoveObservation {
    /// Observe a legal engine move in the position it is about to be played in.
    /// Returns `None` for moves without a source square (drops).
    pub fn from_engine(pos: &Chess, mv: &Move) -> Option<Self> {
        let from = mv.from()?;
        let to = mv.to();

        let mut hints = MoveKinds::empty();
        match mv {
            Move::Castle { .. } => hints.insert(MoveKind::Castle),
            Move::EnPassant { .. } => {
                hints.insert(MoveKind::EnPassant);
                hints.insert(MoveKind::Capture);
            }
            Move::Normal { capture, promotion, .. } => {
                if capture.is_some() {
                    hints.insert(MoveKind::Capture);
                }
                if promotion.is_some() {
                    hints.insert(MoveKind::Promotion);
                }
            }
            _ => {}
        }

        Some(Self {
            from,
            to,
            role: mv.role(),
            hints,
            turn: pos.turn(),
            destination: pos.board().piece_at(to),
        })
    }
}

/// Result of classification, computed once per move and threaded through
/// the tracker and the event collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub from: Square,
    pub to: Square,
    pub role: Role,
    pub turn: Color,
    pub kinds: MoveKinds,
}

impl Classification {
    pub fn is(&self, kind: MoveKind) -> bool {
        self.kinds.contains(kind)
    }

    /// Castling side implied by the king's direction of travel.
    pub fn castling_side(&self) -> Option<CastlingSide> {
        if !self.is(MoveKind::Castle) {
            return None;
        }
        Some(if self.to.file() > self.from.file() {
            CastlingSide::KingSide
        } else {
            CastlingSide::QueenSide
        })
    }

    /// Square the moving piece ends up on. For castling this is the fixed
    /// king destination, whatever square the engine reported.
    pub fn landing(&self) -> Square {
        match self.castling_side() {
            Some(side) => side.king_to(self.turn),
            None => self.to,
        }
    }

    /// Square of the piece being captured, if any. For en passant this is the
    /// square sharing the destination's file and the source's rank.
    pub fn victim_square(&self) -> Option<Square> {
        if self.is(MoveKind::Castle) {
            return None;
        }
        if self.is(MoveKind::EnPassant) {
            return Some(Square::from_coords(self.to.file(), self.from.rank()));
        }
        self.is(MoveKind::Capture).then_some(self.to)
    }
}

/// Classify a move from its observation.
///
/// Hints are trusted when present. Independently of them:
/// - castling: a king moving more than one file;
/// - en passant: a pawn moving diagonally onto an empty square;
/// - promotion: a pawn landing on the last rank for its color;
/// - capture: an opposing piece on the destination, or en passant.
pub fn classify(obs: &MoveObservation) -> Classification {
    let mut kinds = obs.hints;
    kinds.0 &= !MoveKind::Normal.bit();

    let file_delta = (obs.to.file() as i32 - obs.from.file() as i32).abs();

    if obs.role == Role::King && file_delta > 1 {
        kinds.insert(MoveKind::Castle);
    }

    if obs.role == Role::Pawn {
        if file_delta != 0 && obs.destination.is_none() {
            kinds.insert(MoveKind::EnPassant);
        }
        let last_rank = match obs.turn {
            Color::White => Rank::Eighth,
            Color::Black => Rank::First,
        };
        if obs.to.rank() == last_rank {
            kinds.insert(MoveKind::Promotion);
        }
    }

    let hostile_destination = obs
        .destination
        .is_some_and(|piece| piece.color != obs.turn);
    if !kinds.contains(MoveKind::Castle)
        && (hostile_destination || kinds.contains(MoveKind::EnPassant))
    {
        kinds.insert(MoveKind::Capture);
    }

    // King-takes-rook castling encodings land on an own piece; never a capture.
    if kinds.contains(MoveKind::Castle) {
        kinds.0 &= !MoveKind::Capture.bit();
    }

    if kinds.is_empty() {
        kinds.insert(MoveKind::Normal);
    }

    Classification {
        from: obs.from,
        to: obs.to,
        role: obs.role,
        turn: obs.turn,
        kinds,
    }
}
