#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chess_core::GameTask;
use killer::{Aggregator, GameProcessor, KillerConfig, Verdict};
use shakmaty::san::SanPlus;

/// Parse space-separated SAN into a replay task.
pub fn task(moves: &str) -> GameTask {
    GameTask {
        index: 0,
        moves: moves
            .split_whitespace()
            .map(|s| s.parse::<SanPlus>().unwrap_or_else(|_| panic!("bad SAN {s}")))
            .collect(),
        malformed: None,
        nonstandard: false,
    }
}

/// Replay one game into a fresh aggregator.
pub fn replay(moves: &str) -> (Aggregator, Verdict) {
    let mut processor = GameProcessor::new(false);
    let mut stats = Aggregator::new(75);
    let verdict = processor.replay(&task(moves), &mut stats);
    (stats, verdict)
}

/// One PGN game with a few header tags.
pub fn pgn_game(white: &str, black: &str, result: &str, movetext: &str) -> String {
    format!(
        "[Event \"Rated Blitz game\"]\n[White \"{white}\"]\n[Black \"{black}\"]\n[Result \"{result}\"]\n\n{movetext} {result}\n\n"
    )
}

pub const FOOLS_MATE: &str = "1. f3 e5 2. g4 Qh4#";
pub const SCANDINAVIAN: &str = "1. e4 { [%clk 0:03:00] } d5 2. exd5 Qxd5 3. Nc3 Qa5";
pub const ILLEGAL_KING_WALK: &str = "1. e4 d5 2. exd5 Qxd5 3. Ke3 Qe4";
pub const EN_PASSANT: &str = "1. e4 a6 2. e5 d5 3. exd6 cxd6";
pub const PROMOTION: &str = "1. a4 b5 2. axb5 a6 3. bxa6 Bb7 4. axb7 Nc6 5. bxa8=Q e6 6. Qxd8+ Kxd8";

/// Six games covering every kind of outcome: 11 events from 4 committed games,
/// one illegal game and one custom start position.
pub fn mixed_cycle() -> Vec<String> {
    vec![
        pgn_game("alice", "bob", "0-1", FOOLS_MATE),
        pgn_game("carol", "dave", "1/2-1/2", SCANDINAVIAN),
        pgn_game("erin", "frank", "*", ILLEGAL_KING_WALK),
        "[Event \"Odds\"]\n[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/8/4K2R w K - 0 1\"]\n\n1. Rh8# 1-0\n\n".to_string(),
        pgn_game("grace", "heidi", "*", EN_PASSANT),
        pgn_game("ivan", "judy", "1-0", PROMOTION),
    ]
}

pub const EVENTS_PER_CYCLE: u64 = 11;

pub fn write_pgn(dir: &Path, games: &[String]) -> PathBuf {
    let path = dir.join("games.pgn");
    fs::write(&path, games.concat()).unwrap();
    path
}

/// Config for a run over `pgn` writing into `out`.
pub fn config(pgn: &Path, out: &Path, save_interval: u64) -> KillerConfig {
    let mut config = KillerConfig::with_pgn(pgn);
    config.output_dir = out.to_path_buf();
    config.save_interval = save_interval;
    config.progress_interval = 1_000;
    config.workers = 3;
    config.queue_capacity = 2;
    config
}
