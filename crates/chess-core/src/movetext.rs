//! Token-level check of a game's movetext.
//!
//! pgn-reader drops tokens it cannot read as SAN without telling the visitor,
//! so a game with a garbled move would otherwise replay as if the move were
//! never there. This scan sees every main-line token: tag and escape lines,
//! comments, variations, NAGs, move numbers and results are skipped, and
//! whatever is left must parse as SAN.

use shakmaty::san::SanPlus;

use crate::error::MovetextError;

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'{' | b'}' | b'(' | b')' | b';')
}

/// Index of the next `\n` at or after `from`, or the end of input.
fn end_of_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |n| from + n)
}

/// `Ok(true)` for a move, `Ok(false)` for punctuation.
fn check_token(token: &str) -> Result<bool, MovetextError> {
    if matches!(token, "1-0" | "0-1" | "1/2-1/2" | "½-½" | "*") || token.starts_with('$') {
        return Ok(false);
    }

    // Move numbers, alone ("12.", "12...") or glued to the move ("12.e4").
    let digits = token.bytes().take_while(u8::is_ascii_digit).count();
    let rest = &token[digits..];
    let dots = rest.bytes().take_while(|&b| b == b'.').count();
    let san = if digits == 0 || dots > 0 || rest.is_empty() {
        &rest[dots..]
    } else {
        token
    };

    let san = san.trim_end_matches(['!', '?']);
    if san.is_empty() {
        return Ok(false);
    }
    SanPlus::from_ascii(san.as_bytes())
        .map(|_| true)
        .map_err(|_| MovetextError::BadToken {
            token: token.to_string(),
        })
}

/// Check every main-line token of one raw game. Returns the number of moves.
pub fn check_movetext(text: &str) -> Result<usize, MovetextError> {
    let bytes = text.as_bytes();
    let mut moves = 0;
    let mut depth = 0usize;
    let mut line_start = true;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                line_start = true;
                i += 1;
            }
            b if b.is_ascii_whitespace() => i += 1,
            b'[' | b'%' if line_start => i = end_of_line(bytes, i),
            b';' => i = end_of_line(bytes, i),
            b'{' => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'}')
                    .map_or(bytes.len(), |n| i + n + 1);
                line_start = false;
            }
            b'(' => {
                depth += 1;
                i += 1;
                line_start = false;
            }
            b')' | b'}' => {
                if bytes[i] == b')' {
                    depth = depth.saturating_sub(1);
                }
                i += 1;
                line_start = false;
            }
            _ => {
                let start = i;
                while i < bytes.len() && !is_delimiter(bytes[i]) {
                    i += 1;
                }
                line_start = false;
                if depth == 0 && check_token(&text[start..i])? {
                    moves += 1;
                }
            }
        }
    }
    Ok(moves)
}
