//! Run configuration from environment variables, overridable from the command line

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};

use crate::error::KillerError;

pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";
pub const FINAL_RESULT_FILE_NAME: &str = "final_matrix.json";

/// Upper bound on replay workers. Each one holds a blocking-pool thread for the
/// whole run, next to the reader and the checkpoint writer, and tokio's pool
/// tops out at 512.
pub const MAX_WORKERS: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// One thread: read, replay and aggregate in a single pass
    Sequential,
    /// One reader, a pool of replay workers, merge at the end
    Parallel,
}

impl FromStr for Mode {
    type Err = KillerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(Mode::Sequential),
            "parallel" | "par" => Ok(Mode::Parallel),
            other => Err(KillerError::Config(format!("unknown mode '{other}'"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct KillerConfig {
    /// PGN file to ingest
    pub pgn_path: PathBuf,

    /// Directory receiving the checkpoint and the final result
    pub output_dir: PathBuf,

    /// Last move bucket; later moves are clamped into it
    pub max_move_index: usize,

    /// Games between checkpoints
    pub save_interval: u64,

    /// Games between progress lines (sequential mode)
    pub progress_interval: u64,

    pub mode: Mode,

    /// Replay threads in parallel mode
    pub workers: usize,

    /// Bounded queue between reader and workers
    pub queue_capacity: usize,

    /// Invalidate a game on tracker desync instead of only counting it
    pub strict_desync: bool,

    /// Ignore an existing checkpoint
    pub fresh: bool,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl KillerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, KillerError> {
        let pgn_path = env::var("PGN_PATH")
            .map(PathBuf::from)
            .map_err(|_| KillerError::Config("PGN_PATH not set".to_string()))?;
        Self::from_env(pgn_path)
    }

    /// Defaults overridden by whatever environment variables are set.
    pub fn from_env(pgn_path: PathBuf) -> Result<Self, KillerError> {
        let mut config = Self::with_pgn(pgn_path);

        config.output_dir = env::var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(config.output_dir);
        config.max_move_index = env_parse("MAX_MOVE_INDEX", config.max_move_index);
        config.save_interval = env_parse("SAVE_INTERVAL", config.save_interval);
        config.progress_interval = env_parse("PROGRESS_INTERVAL", config.progress_interval);
        config.workers = env_parse("WORKERS", config.workers);
        config.queue_capacity = env_parse("QUEUE_CAPACITY", config.queue_capacity);
        config.strict_desync = env_parse("STRICT_DESYNC", config.strict_desync);
        if let Ok(mode) = env::var("KILLER_MODE") {
            config.mode = mode.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults for everything but the source path.
    pub fn with_pgn(pgn_path: impl Into<PathBuf>) -> Self {
        Self {
            pgn_path: pgn_path.into(),
            output_dir: PathBuf::from("outcome/chess_killer"),
            max_move_index: 75,
            save_interval: 10_000,
            progress_interval: 50_000,
            mode: Mode::Sequential,
            workers: num_cpus::get().clamp(1, MAX_WORKERS),
            queue_capacity: 5_000,
            strict_desync: false,
            fresh: false,
        }
    }

    pub fn validate(&self) -> Result<(), KillerError> {
        if self.workers == 0 {
            return Err(KillerError::Config("workers must be at least 1".to_string()));
        }
        if self.workers > MAX_WORKERS {
            return Err(KillerError::Config(format!(
                "workers must be at most {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if self.queue_capacity == 0 {
            return Err(KillerError::Config("queue capacity must be at least 1".to_string()));
        }
        if self.save_interval == 0 {
            return Err(KillerError::Config("save interval must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(CHECKPOINT_FILE_NAME)
    }

    pub fn final_result_path(&self) -> PathBuf {
        self.output_dir.join(FINAL_RESULT_FILE_NAME)
    }
}

/// Command-line overrides. Every flag is optional; unset flags keep the
/// environment value or the default.
#[derive(Parser, Debug, Default)]
#[command(name = "chess-killer", about = "Attribute every capture in a PGN corpus to the piece that made it")]
pub struct Cli {
    /// PGN file (overrides PGN_PATH)
    #[arg(long)]
    pub pgn: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub max_move_index: Option<usize>,

    #[arg(long)]
    pub save_interval: Option<u64>,

    #[arg(long)]
    pub queue_capacity: Option<usize>,

    #[arg(long)]
    pub strict_desync: bool,

    /// Start over even if a checkpoint exists
    #[arg(long)]
    pub fresh: bool,
}

impl Cli {
    /// Build the final configuration: environment first, then flags on top.
    pub fn into_config(self) -> Result<KillerConfig, KillerError> {
        let mut config = match &self.pgn {
            Some(pgn) => KillerConfig::from_env(pgn.clone())?,
            None => KillerConfig::load()?,
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut KillerConfig) {
        if let Some(pgn) = &self.pgn {
            config.pgn_path = pgn.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(max) = self.max_move_index {
            config.max_move_index = max;
        }
        if let Some(interval) = self.save_interval {
            config.save_interval = interval;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        config.strict_desync |= self.strict_desync;
        config.fresh |= self.fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("Parallel".parse::<Mode>().unwrap(), Mode::Parallel);
        assert_eq!("seq".parse::<Mode>().unwrap(), Mode::Sequential);
        assert!("turbo".parse::<Mode>().is_err());
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::parse_from([
            "chess-killer",
            "--pgn",
            "games.pgn",
            "--mode",
            "parallel",
            "--workers",
            "3",
            "--max-move-index",
            "150",
            "--fresh",
        ]);
        let mut config = KillerConfig::with_pgn("other.pgn");
        cli.apply(&mut config);
        assert_eq!(config.pgn_path, PathBuf::from("games.pgn"));
        assert_eq!(config.mode, Mode::Parallel);
        assert_eq!(config.workers, 3);
        assert_eq!(config.max_move_index, 150);
        assert!(config.fresh);
        assert!(!config.strict_desync);
        assert_eq!(config.checkpoint_path(), PathBuf::from("outcome/chess_killer/checkpoint.json"));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = KillerConfig::with_pgn("games.pgn");
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_workers() {
        let mut config = KillerConfig::with_pgn("games.pgn");
        config.workers = MAX_WORKERS;
        assert!(config.validate().is_ok());
        config.workers = MAX_WORKERS + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most 256"));
    }
}
