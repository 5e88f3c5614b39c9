//! Frame text generation.

use crate::error::StreamFault;

/// The single token a frame is built from.
pub const WORD: &str = "x";

/// Bytes taken by one token plus its trailing separator.
const UNIT_LEN: i64 = WORD.len() as i64 + 1;

/// Number of tokens in a frame: `max(1, floor(bytes_per_frame / 2))`.
pub fn words_per_frame(bytes_per_frame: i64) -> u64 {
    bytes_per_frame.div_euclid(UNIT_LEN).max(1) as u64
}

/// Build the text of one frame for the given size.
///
/// Sizes that cannot be allocated are reported as a fault instead of aborting
/// the process, so the stream can still terminate with an error frame.
pub fn frame_text(bytes_per_frame: i64) -> Result<String, StreamFault> {
    let words = words_per_frame(bytes_per_frame);
    let len = words
        .checked_mul(UNIT_LEN as u64)
        .ok_or(StreamFault::Allocation(u64::MAX))?;
    let capacity = usize::try_from(len).map_err(|_| StreamFault::Allocation(len))?;

    let mut text = String::new();
    text.try_reserve_exact(capacity)
        .map_err(|_| StreamFault::Allocation(len))?;
    for _ in 0..words {
        text.push_str(WORD);
        text.push(' ');
    }
    Ok(text)
}
