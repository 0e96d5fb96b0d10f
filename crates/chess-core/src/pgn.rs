//! Splits a PGN stream into raw games at exact byte offsets.
//!
//! Games are only delimited by their position in the stream, so the source is
//! consumed by a single reader. A new game starts at the first tag line that
//! follows movetext, or that follows a blank line closing a tag block (a game
//! with no moves); the offset of that line is the resume marker for
//! everything before it.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::SourceError;
use crate::game_data::RawGame;

const READ_BUFFER_BYTES: usize = 1 << 20;

/// `[Name "value"]` style line (as opposed to a `[%clk ...]` comment payload).
fn is_tag_line(line: &[u8]) -> bool {
    let trimmed = line.trim_ascii_start();
    trimmed.first() == Some(&b'[') && trimmed.get(1).is_some_and(|b| b.is_ascii_alphabetic())
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}

pub struct GameSource<R> {
    reader: R,
    /// Bytes consumed from `reader`, as an absolute stream offset.
    offset: u64,
    /// Tag line already read that opens the next game.
    pending: Option<(u64, Vec<u8>)>,
    next_index: u64,
    line: Vec<u8>,
}

impl GameSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::with_capacity(READ_BUFFER_BYTES, file)))
    }

    /// Open `path` positioned at `offset`, numbering games from `first_index`.
    pub fn open_at<P: AsRef<Path>>(path: P, offset: u64, first_index: u64) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Self::resume(BufReader::with_capacity(READ_BUFFER_BYTES, file), offset, first_index)
    }
}

impl<R: BufRead + Seek> GameSource<R> {
    /// Seek to `offset` and check that it is a game boundary: the first
    /// non-blank line there must be a tag line, or the stream must end.
    pub fn resume(mut reader: R, offset: u64, first_index: u64) -> Result<Self, SourceError> {
        reader.seek(SeekFrom::Start(offset))?;
        let mut source = Self {
            reader,
            offset,
            pending: None,
            next_index: first_index,
            line: Vec::new(),
        };
        loop {
            let line_start = source.offset;
            if !source.read_line()? {
                return Ok(source);
            }
            if is_blank(&source.line) {
                continue;
            }
            if is_tag_line(&source.line) {
                source.pending = Some((line_start, std::mem::take(&mut source.line)));
                return Ok(source);
            }
            return Err(SourceError::Misaligned { offset });
        }
    }
}

impl<R: BufRead> GameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            pending: None,
            next_index: 0,
            line: Vec::new(),
        }
    }

    /// Offset at which the next unread game begins.
    pub fn position(&self) -> u64 {
        match &self.pending {
            Some((start, _)) => *start,
            None => self.offset,
        }
    }

    /// Index the next game will get.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    fn read_line(&mut self) -> std::io::Result<bool> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        self.offset += n as u64;
        Ok(n > 0)
    }

    /// Read the next game's raw text. `Ok(None)` at end of stream.
    pub fn next_game(&mut self) -> std::io::Result<Option<RawGame>> {
        let mut text: Vec<u8> = Vec::new();
        let mut start = None;
        let mut in_movetext = false;
        let mut after_blank = false;

        if let Some((line_start, line)) = self.pending.take() {
            start = Some(line_start);
            text.extend_from_slice(&line);
        }

        loop {
            let line_start = self.offset;
            if !self.read_line()? {
                break;
            }
            if is_blank(&self.line) {
                if start.is_some() {
                    text.extend_from_slice(&self.line);
                    after_blank = true;
                }
                continue;
            }
            if is_tag_line(&self.line) {
                if in_movetext || after_blank {
                    self.pending = Some((line_start, std::mem::take(&mut self.line)));
                    break;
                }
            } else {
                in_movetext = true;
            }
            after_blank = false;
            start.get_or_insert(line_start);
            text.extend_from_slice(&self.line);
        }

        let Some(start_offset) = start else {
            return Ok(None);
        };

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(RawGame {
            index,
            start_offset,
            end_offset: self.position(),
            text: String::from_utf8_lossy(&text).into_owned(),
        }))
    }

    /// Consume up to `count` games without returning them. Returns how many were skipped.
    pub fn skip_games(&mut self, count: u64) -> std::io::Result<u64> {
        let mut skipped = 0;
        while skipped < count {
            if self.next_game()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }
}
