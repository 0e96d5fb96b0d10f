//! Run-level and game-level error types

use chess_core::SourceError;
use shakmaty::Square;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KillerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Checkpoint was written with max move index {found}, run is configured for {expected}")]
    CheckpointMismatch { expected: usize, found: usize },

    #[error("Worker error: {0}")]
    Worker(String),
}

/// Reasons a single game is dropped without committing anything.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("illegal move {san} at ply {ply}: {reason}")]
    IllegalMove { ply: usize, san: String, reason: String },

    #[error("malformed movetext: {0}")]
    Malformed(String),

    #[error("tracker desync on {square}")]
    Desync { square: Square },
}
