//! Whole-file runs: sequential and parallel agree, and a resumed run ends
//! exactly where an uninterrupted one does.

mod common;

use std::fs;

use killer::{run, run_parallel, run_sequential, CheckpointManager, KillerConfig, Mode};

use common::{config, mixed_cycle, pgn_game, write_pgn, EVENTS_PER_CYCLE};

fn corpus(cycles: usize) -> Vec<String> {
    (0..cycles).flat_map(|_| mixed_cycle()).collect()
}

fn manager(config: &KillerConfig) -> CheckpointManager {
    CheckpointManager::new(config.checkpoint_path(), config.save_interval)
}

#[test]
fn test_sequential_counts() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_pgn(dir.path(), &corpus(2));
    let config = config(&pgn, &dir.path().join("out"), 5);

    let summary = run_sequential(&config, &manager(&config), None).unwrap();
    assert_eq!(summary.games_processed(), 12);
    assert_eq!(summary.marker.resume_offset, Some(fs::metadata(&pgn).unwrap().len()));

    let counters = &summary.stats.counters;
    assert_eq!(counters.games_committed, 8);
    assert_eq!(counters.games_invalid, 2);
    assert_eq!(counters.games_nonstandard, 2);
    assert_eq!(counters.events_committed, 2 * EVENTS_PER_CYCLE);
    assert_eq!(counters.events_discarded, 4);
    assert_eq!(summary.stats.total_kills(), 2 * EVENTS_PER_CYCLE);
    assert_eq!(summary.stats.kills("Black_Queen", "White_King").unwrap()[1], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_matches_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_pgn(dir.path(), &corpus(4));

    let seq_config = config(&pgn, &dir.path().join("seq"), 5);
    let sequential = run_sequential(&seq_config, &manager(&seq_config), None).unwrap();

    let par_config = config(&pgn, &dir.path().join("par"), 5);
    let parallel = run_parallel(&par_config, &manager(&par_config), None).await.unwrap();

    assert_eq!(parallel.marker, sequential.marker);
    assert_eq!(parallel.stats, sequential.stats);

    // Mid-run checkpoints cover the same games in both modes.
    let seq_checkpoint = manager(&seq_config).load().unwrap().unwrap();
    let par_checkpoint = manager(&par_config).load().unwrap().unwrap();
    assert_eq!(seq_checkpoint.games_processed, 20);
    assert_eq!(par_checkpoint, seq_checkpoint);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_garbled_token_and_variation_in_both_modes() {
    let dir = tempfile::tempdir().unwrap();
    let games = vec![
        pgn_game("alice", "bob", "1-0", "1. e4 d5 2. exd5 Zz9"),
        pgn_game("carol", "dave", "1-0", "1. e4 d5 (1... e5 2. Nf3 Nc6) 2. exd5"),
    ];
    let pgn = write_pgn(dir.path(), &games);

    let seq_config = config(&pgn, &dir.path().join("seq"), 10);
    let sequential = run_sequential(&seq_config, &manager(&seq_config), None).unwrap();
    let par_config = config(&pgn, &dir.path().join("par"), 10);
    let parallel = run_parallel(&par_config, &manager(&par_config), None).await.unwrap();

    for summary in [&sequential, &parallel] {
        let counters = &summary.stats.counters;
        assert_eq!(summary.games_processed(), 2);
        assert_eq!(counters.games_invalid, 1);
        assert_eq!(counters.games_committed, 1);
        assert_eq!(summary.stats.total_kills(), 1);
        assert_eq!(summary.stats.kills("White_Pawn_e", "Black_Pawn_d").unwrap()[1], 1);
    }
    assert_eq!(parallel.stats, sequential.stats);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_worker_parallel_run() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_pgn(dir.path(), &corpus(1));
    let mut config = config(&pgn, &dir.path().join("out"), 2);
    config.workers = 1;

    let summary = run_parallel(&config, &manager(&config), None).await.unwrap();
    assert_eq!(summary.games_processed(), 6);
    assert_eq!(summary.stats.total_kills(), EVENTS_PER_CYCLE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_from_checkpoint_matches_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_pgn(dir.path(), &corpus(2));

    let full_config = config(&pgn, &dir.path().join("full"), 1_000);
    let full = run_sequential(&full_config, &manager(&full_config), None).unwrap();

    // Leaves a checkpoint after game 10 behind, as if the run died there.
    let cut_config = config(&pgn, &dir.path().join("cut"), 5);
    run_sequential(&cut_config, &manager(&cut_config), None).unwrap();
    let checkpoint = manager(&cut_config).restore(75).unwrap().unwrap();
    assert_eq!(checkpoint.games_processed, 10);
    assert!(checkpoint.resume_offset.is_some());

    let resumed = run_sequential(&cut_config, &manager(&cut_config), Some(checkpoint.clone())).unwrap();
    assert_eq!(resumed.stats, full.stats);
    assert_eq!(resumed.games_processed(), 12);

    let resumed = run_parallel(&cut_config, &manager(&cut_config), Some(checkpoint.clone()))
        .await
        .unwrap();
    assert_eq!(resumed.stats, full.stats);

    // Without a usable offset the source is skipped game by game.
    let mut by_count = checkpoint.clone();
    by_count.resume_offset = None;
    let resumed = run_sequential(&cut_config, &manager(&cut_config), Some(by_count)).unwrap();
    assert_eq!(resumed.stats, full.stats);

    let mut misaligned = checkpoint;
    misaligned.resume_offset = Some(3);
    let resumed = run_sequential(&cut_config, &manager(&cut_config), Some(misaligned)).unwrap();
    assert_eq!(resumed.stats, full.stats);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_writes_report_and_is_idempotent_when_complete() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_pgn(dir.path(), &corpus(1));
    let mut config = config(&pgn, &dir.path().join("out"), 4);
    config.mode = Mode::Parallel;

    let first = run(&config).await.unwrap();
    let report = fs::read(config.final_result_path()).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&report).unwrap();
    assert_eq!(value["meta"]["games_processed"], 6);
    assert_eq!(value["kill_matrix"]["Black_Queen"]["White_King"][1], 1);

    // The final checkpoint sits at the end of the file: nothing left to do.
    config.mode = Mode::Sequential;
    let second = run(&config).await.unwrap();
    assert_eq!(second.stats, first.stats);
    assert_eq!(second.games_processed(), 6);
    assert_eq!(fs::read(config.final_result_path()).unwrap(), report);
}
