use shakmaty::san::SanPlus;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Header tags that decide whether a game starts from the standard position.
/// Everything else is ignored.
#[derive(Debug, Clone, Default)]
pub struct GameHeaders {
    pub variant: Option<String>,
    pub fen: Option<String>,
}

impl GameHeaders {
    /// Record a tag; unknown names are dropped.
    pub fn set(&mut self, name: &[u8], value: String) {
        match name {
            b"Variant" => self.variant = Some(value),
            b"FEN" => self.fen = Some(value),
            _ => {}
        }
    }

    /// False for other variants and for custom start positions.
    pub fn is_standard_start(&self) -> bool {
        if let Some(variant) = &self.variant {
            let v = variant.to_ascii_lowercase();
            if !matches!(v.as_str(), "standard" | "chess" | "from position") {
                return false;
            }
        }
        match &self.fen {
            Some(fen) => same_position(fen, STANDARD_START_FEN),
            None => true,
        }
    }
}

/// Compare FENs on placement, side, castling and en passant; move counters are ignored.
fn same_position(a: &str, b: &str) -> bool {
    a.split_whitespace()
        .take(4)
        .eq(b.split_whitespace().take(4))
}

/// One game exactly as it appears in the source, with its byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGame {
    /// 0-based position of this game in the source.
    pub index: u64,
    pub start_offset: u64,
    /// Offset at which the next game begins.
    pub end_offset: u64,
    pub text: String,
}

/// Unit of work handed to a replay worker: just the moves.
#[derive(Debug, Clone, Default)]
pub struct GameTask {
    pub index: u64,
    pub moves: Vec<SanPlus>,
    /// Set when the movetext could not be tokenized.
    pub malformed: Option<String>,
    /// Set for games that do not start from the standard position.
    pub nonstandard: bool,
}
