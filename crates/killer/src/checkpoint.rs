//! Durable snapshots of the aggregator plus the resume marker.
//!
//! Every write goes to `<path>.tmp` first and is renamed over the live file,
//! so a reader only ever sees the previous or the new complete checkpoint.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::aggregator::{Aggregator, Histogram, RunCounters};
use crate::error::KillerError;

/// Where to pick up on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumeMarker {
    /// Games read from the source so far, whatever happened to them.
    pub games_processed: u64,
    /// Byte offset of the first game not yet accounted for.
    pub resume_offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub games_processed: u64,
    #[serde(default)]
    pub resume_offset: Option<u64>,
    pub stats: Aggregator,
}

impl Checkpoint {
    pub fn marker(&self) -> ResumeMarker {
        ResumeMarker {
            games_processed: self.games_processed,
            resume_offset: self.resume_offset,
        }
    }
}

/// Same layout as `Checkpoint`, borrowing the live aggregator.
#[derive(Serialize)]
struct CheckpointView<'a> {
    games_processed: u64,
    resume_offset: Option<u64>,
    stats: &'a Aggregator,
}

/// Final output: histograms at the top level plus run metadata.
#[derive(Serialize)]
struct FinalReport<'a> {
    kill_matrix: &'a BTreeMap<String, BTreeMap<String, Histogram>>,
    death_timeline: &'a BTreeMap<String, Histogram>,
    death_squares: &'a BTreeMap<String, Histogram>,
    meta: ReportMeta<'a>,
}

#[derive(Serialize)]
struct ReportMeta<'a> {
    games_processed: u64,
    max_move_index: usize,
    #[serde(flatten)]
    counters: &'a RunCounters,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Serialize `value` to `path` via temp file + rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), KillerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let mut writer = BufWriter::new(File::create(&tmp)?);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
    interval: u64,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>, interval: u64) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// True every `interval` games.
    pub fn is_due(&self, games_processed: u64) -> bool {
        games_processed > 0 && games_processed % self.interval == 0
    }

    /// Read the live checkpoint; `Ok(None)` if there is none yet.
    pub fn load(&self) -> Result<Option<Checkpoint>, KillerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(checkpoint))
    }

    /// Load and check that the histograms have the configured width.
    pub fn restore(&self, max_move_index: usize) -> Result<Option<Checkpoint>, KillerError> {
        let Some(checkpoint) = self.load()? else {
            return Ok(None);
        };
        if checkpoint.stats.max_move_index != max_move_index {
            return Err(KillerError::CheckpointMismatch {
                expected: max_move_index,
                found: checkpoint.stats.max_move_index,
            });
        }
        info!(
            games = checkpoint.games_processed,
            offset = ?checkpoint.resume_offset,
            path = %self.path.display(),
            "Restored checkpoint"
        );
        Ok(Some(checkpoint))
    }

    pub fn save(&self, marker: ResumeMarker, stats: &Aggregator) -> Result<(), KillerError> {
        let view = CheckpointView {
            games_processed: marker.games_processed,
            resume_offset: marker.resume_offset,
            stats,
        };
        write_json_atomic(&self.path, &view, false)
    }

    /// Save, logging instead of failing: the previous checkpoint stays intact
    /// if this write does not complete.
    pub fn save_or_log(&self, marker: ResumeMarker, stats: &Aggregator) -> bool {
        match self.save(marker, stats) {
            Ok(()) => {
                info!(games = marker.games_processed, offset = ?marker.resume_offset, "Checkpoint saved");
                true
            }
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "Checkpoint write failed, continuing");
                false
            }
        }
    }
}

/// Write the human-readable final result.
pub fn write_final_report(path: &Path, stats: &Aggregator, games_processed: u64) -> Result<(), KillerError> {
    let report = FinalReport {
        kill_matrix: &stats.kill_matrix,
        death_timeline: &stats.death_timeline,
        death_squares: &stats.death_squares,
        meta: ReportMeta {
            games_processed,
            max_move_index: stats.max_move_index,
            counters: &stats.counters,
        },
    };
    write_json_atomic(path, &report, true)
}
