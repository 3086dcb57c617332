//! Run-length codec.
//!
//! Input is emitted as `(byte, count)` token pairs, one per maximal run,
//! with `count` in `1..=255`. Longer runs are split into several tokens.
//!
//! Every run produces a token, including runs of one byte, so data without
//! repetition doubles in size. Callers that must never expand their input
//! have to compare sizes themselves and keep the raw bytes instead.

use thiserror::Error;

/// Longest run a single token can describe.
pub const MAX_RUN: usize = u8::MAX as usize;

/// Errors produced while decoding a token stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Stream ended after a byte with no count following it
    #[error("truncated token at offset {offset}")]
    Truncated { offset: usize },
    /// A token carried a zero count
    #[error("zero-length run at offset {offset}")]
    ZeroCount { offset: usize },
}

/// Encode `data` as run-length tokens.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + 2);
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        let mut run = 1;
        while i + run < data.len() && data[i + run] == byte && run < MAX_RUN {
            run += 1;
        }
        out.push(byte);
        out.push(run as u8);
        i += run;
    }
    out
}

/// Expand a token stream produced by [`encode`].
pub fn decode(tokens: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if tokens.len() % 2 != 0 {
        return Err(DecodeError::Truncated {
            offset: tokens.len() - 1,
        });
    }

    let expanded: usize = tokens.chunks_exact(2).map(|t| t[1] as usize).sum();
    let mut out = Vec::with_capacity(expanded);
    for (index, token) in tokens.chunks_exact(2).enumerate() {
        let (byte, count) = (token[0], token[1]);
        if count == 0 {
            return Err(DecodeError::ZeroCount { offset: index * 2 });
        }
        out.resize(out.len() + count as usize, byte);
    }
    Ok(out)
}
