//! LZSS decompression (the read side of a packed stream).

use slpack_core::traits::CodecStream;

use crate::{MAX_MATCH, THRESHOLD, WINDOW_SIZE};

/// Where a suspended [`LzssDecoder::decode`] call resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeResume {
    /// Not suspended; the next call starts reading a fresh stream.
    Idle,
    /// Output filled right after a literal; resume at the next unit.
    AfterLiteral,
    /// Output filled inside a back-reference copy; resume inside it.
    MidMatch,
}

/// Resumable LZSS decompressor.
///
/// Pulls encoded bytes from a [`CodecStream`] and fills the caller's output
/// slice. A call returns early when the slice fills, saving enough state —
/// including the position inside a half-copied match — to continue on the
/// next call as if it had never stopped.
pub struct LzssDecoder {
    resume: DecodeResume,
    /// Control bits; bit 8 counts down the eight units of a batch.
    flags: u32,
    /// Ring write cursor.
    r: usize,
    /// Window position of the match being copied.
    match_pos: usize,
    /// Final copy index of the match (inclusive: `match_len + 1` bytes).
    match_len: usize,
    /// Next copy index within the match.
    match_idx: usize,
    ring: [u8; WINDOW_SIZE],
}

impl LzssDecoder {
    /// Create a decoder ready for a fresh stream.
    pub fn new() -> Self {
        Self {
            resume: DecodeResume::Idle,
            flags: 0,
            r: 0,
            match_pos: 0,
            match_len: 0,
            match_idx: 0,
            ring: [0; WINDOW_SIZE],
        }
    }

    /// True if the previous call suspended in the middle of a match copy.
    ///
    /// The stream layer needs this to decide whether a stream whose byte
    /// budget reads as exhausted still has output pending; a suspended copy
    /// means more bytes are coming without any further input.
    pub fn has_pending_output(&self) -> bool {
        self.resume == DecodeResume::MidMatch
    }

    /// Decompress from `src` until `out` is full or the input ends.
    ///
    /// Returns the number of bytes written to `out`. A short return means
    /// the input hit EOF (or an error — consult the source stream); a full
    /// return may leave the decoder suspended mid-unit.
    pub fn decode<S: CodecStream>(&mut self, src: &mut S, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let mut size = 0usize;

        match self.resume {
            DecodeResume::MidMatch => {
                if self.copy_match(out, &mut size) {
                    return size;
                }
            }
            DecodeResume::AfterLiteral => {}
            DecodeResume::Idle => {
                self.r = WINDOW_SIZE - MAX_MATCH;
                self.flags = 0;
            }
        }

        loop {
            self.flags >>= 1;
            if self.flags & 0x100 == 0 {
                let Some(mut c) = src.get_byte() else { break };
                if let Some(k) = src.legacy_key_byte() {
                    // Legacy cipher scope: only the control byte is masked.
                    c ^= k;
                }
                // The high byte counts the eight units of the batch.
                self.flags = u32::from(c) | 0xFF00;
            }

            if self.flags & 1 != 0 {
                let Some(c) = src.get_byte() else { break };
                self.ring[self.r] = c;
                self.r = (self.r + 1) & (WINDOW_SIZE - 1);
                out[size] = c;
                size += 1;
                if size >= out.len() {
                    self.resume = DecodeResume::AfterLiteral;
                    return size;
                }
            } else {
                let Some(lo) = src.get_byte() else { break };
                let Some(hi) = src.get_byte() else { break };
                self.match_pos = usize::from(lo) | (usize::from(hi & 0xF0) << 4);
                self.match_len = usize::from(hi & 0x0F) + THRESHOLD;
                self.match_idx = 0;
                if self.copy_match(out, &mut size) {
                    return size;
                }
            }
        }

        self.resume = DecodeResume::Idle;
        size
    }

    /// Copy the current back-reference byte by byte, through the ring, so
    /// that self-overlapping matches (distance shorter than length) read
    /// the bytes this very copy just produced.
    ///
    /// Returns true and marks the decoder suspended if `out` filled first.
    fn copy_match(&mut self, out: &mut [u8], size: &mut usize) -> bool {
        while self.match_idx <= self.match_len {
            let c = self.ring[(self.match_pos + self.match_idx) & (WINDOW_SIZE - 1)];
            self.ring[self.r] = c;
            self.r = (self.r + 1) & (WINDOW_SIZE - 1);
            out[*size] = c;
            *size += 1;
            self.match_idx += 1;
            if *size >= out.len() {
                self.resume = DecodeResume::MidMatch;
                return true;
            }
        }
        false
    }
}

impl Default for LzssDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LzssDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzssDecoder")
            .field("resume", &self.resume)
            .field("r", &self.r)
            .field("match_idx", &self.match_idx)
            .field("match_len", &self.match_len)
            .finish_non_exhaustive()
    }
}
