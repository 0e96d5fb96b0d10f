//! Kill/death attribution over large PGN corpora.
//!
//! Every capture (and every mate) in a game is credited to the piece that
//! made it, identified by its starting square, and bucketed by move number.
//! A game contributes all of its events or none of them.

pub mod aggregator;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod processor;

pub use aggregator::{Aggregator, Histogram, RunCounters};
pub use checkpoint::{write_final_report, Checkpoint, CheckpointManager, ResumeMarker};
pub use config::{Cli, KillerConfig, Mode};
pub use error::{GameError, KillerError};
pub use events::{EventCollector, GamePhase, PendingEvent, Verdict};
pub use pipeline::{run, run_parallel, run_sequential, RunSummary};
pub use processor::{GameProcessor, UNKNOWN_ATTACKER};
