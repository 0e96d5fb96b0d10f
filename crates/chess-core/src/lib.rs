//! Rules-engine-facing building blocks for piece attribution.
//!
//! Everything here works per game: the identity map that follows each piece
//! across the board, the move classifier, and the PGN splitter that cuts a
//! sequential stream into raw games at known byte offsets.

pub mod classify;
pub mod error;
pub mod game_data;
pub mod identity;
pub mod movetext;
pub mod pgn;

pub use classify::{classify, Classification, MoveKind, MoveKinds, MoveObservation};
pub use error::{MovetextError, SourceError, TrackError};
pub use game_data::{GameHeaders, GameTask, RawGame};
pub use identity::{AppliedMove, CapturedPiece, IdentityTracker, PieceIdentity};
pub use movetext::check_movetext;
pub use pgn::GameSource;
