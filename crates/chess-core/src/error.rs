use shakmaty::Square;
use thiserror::Error;

/// The tracker's view of the board diverged from the rules engine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackError {
    #[error("no tracked identity on {square} but the engine moved a piece from it")]
    Desync { square: Square },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("resume offset {offset} is not at a game boundary")]
    Misaligned { offset: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A movetext token that is neither a move nor PGN punctuation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MovetextError {
    #[error("unreadable move token '{token}'")]
    BadToken { token: String },
}
