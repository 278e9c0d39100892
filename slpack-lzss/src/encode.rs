//! LZSS compression (the write side of a packed stream).
//!
//! The longest-match search runs over 256 binary trees (one per leading
//! byte), kept as flat `lson`/`rson`/`dad` arrays indexed by ring position —
//! an arena layout, not boxed nodes. Tie-breaks fall out of the tree descent
//! and insertion order, which downstream tooling relies on for deterministic
//! output, so the search must not be "improved".

use slpack_core::error::{PackError, Result};
use slpack_core::traits::CodecStream;
use std::io;

use crate::{MAX_MATCH, THRESHOLD, WINDOW_SIZE};

/// Tree sentinel: "no node".
const NIL: u16 = WINDOW_SIZE as u16;

/// Where a suspended [`LzssEncoder::encode`] call resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodeResume {
    /// Not suspended; the next call starts a fresh stream.
    Idle,
    /// Input ran out while filling the initial lookahead.
    FillLookahead,
    /// Input ran out while advancing the window over coded bytes; one byte
    /// (`pending`) has been consumed but not yet folded into the window.
    SlideWindow,
}

/// Resumable LZSS compressor.
///
/// Feed it input slices with [`encode`](Self::encode); encoded bytes are
/// pushed to the [`CodecStream`] it is given. Pass `last = true` on the
/// final call (an empty slice is fine) to flush the partial batch and the
/// drained lookahead. Mid-stream calls with an empty slice are no-ops.
///
/// The struct is around 30 KB (window plus tree arrays); hold it in a `Box`
/// if it lives inside a larger long-lived structure.
pub struct LzssEncoder {
    resume: EncodeResume,
    /// Bytes currently in the lookahead.
    len: usize,
    /// Ring position of the lookahead start; doubles as the tree node id.
    r: usize,
    /// Ring position about to be evicted from the window.
    s: usize,
    /// Byte consumed but not yet processed (SlideWindow suspension).
    pending: u8,
    /// Bytes of the current unit already folded into the window.
    advanced: usize,
    /// Length of the unit being folded (literal: 1, match: its length).
    step: usize,
    /// One control byte plus up to sixteen payload bytes.
    code_buf: [u8; 17],
    code_len: usize,
    /// Control-byte bit for the next unit; batch flushes when it wraps.
    mask: u8,
    match_position: usize,
    match_length: usize,
    lson: [u16; WINDOW_SIZE + 1],
    rson: [u16; WINDOW_SIZE + 257],
    dad: [u16; WINDOW_SIZE + 1],
    /// Ring buffer with F-1 extra bytes mirroring the wrap region, so the
    /// match comparison loop never needs modulo arithmetic.
    ring: [u8; WINDOW_SIZE + MAX_MATCH - 1],
}

impl LzssEncoder {
    /// Create an encoder ready for a fresh stream.
    pub fn new() -> Self {
        Self {
            resume: EncodeResume::Idle,
            len: 0,
            r: 0,
            s: 0,
            pending: 0,
            advanced: 0,
            step: 0,
            code_buf: [0; 17],
            code_len: 0,
            mask: 0,
            match_position: 0,
            match_length: 0,
            lson: [0; WINDOW_SIZE + 1],
            rson: [0; WINDOW_SIZE + 257],
            dad: [0; WINDOW_SIZE + 1],
            ring: [0; WINDOW_SIZE + MAX_MATCH - 1],
        }
    }

    /// Compress `input`, pushing encoded bytes to `dst`.
    ///
    /// With `last = false` the call may suspend once `input` is exhausted;
    /// the next call continues seamlessly. With `last = true` the stream is
    /// finalized: the lookahead drains and the partial batch is emitted.
    ///
    /// Fails only if `dst` reports an error while a batch is being written.
    pub fn encode<S: CodecStream>(&mut self, dst: &mut S, input: &[u8], last: bool) -> Result<()> {
        if input.is_empty() && !last {
            return Ok(());
        }

        let mut pos = 0usize;
        let mut resume_slide = false;

        match self.resume {
            EncodeResume::Idle => {
                self.code_buf[0] = 0;
                self.code_len = 1;
                self.mask = 1;
                self.s = 0;
                self.r = WINDOW_SIZE - MAX_MATCH;
                self.len = 0;
                self.init_tree();
            }
            EncodeResume::FillLookahead => {}
            EncodeResume::SlideWindow => resume_slide = true,
        }

        if !resume_slide {
            while self.len < MAX_MATCH {
                if pos >= input.len() {
                    if !last {
                        self.resume = EncodeResume::FillLookahead;
                        return Ok(());
                    }
                    break;
                }
                self.ring[self.r + self.len] = input[pos];
                pos += 1;
                self.len += 1;
                if pos >= input.len() && !last {
                    self.resume = EncodeResume::FillLookahead;
                    return Ok(());
                }
            }

            if self.len == 0 {
                return Ok(());
            }

            // Seed the trees with the F strings directly before the
            // lookahead, then the lookahead itself. The insertion order
            // keeps the trees from degenerating on runs and fixes the
            // tie-break behavior; match_position/match_length are set by
            // the final insert.
            for i in 1..=MAX_MATCH {
                self.insert_node(self.r - i);
            }
            self.insert_node(self.r);
        }

        loop {
            if !resume_slide {
                if self.match_length > self.len {
                    self.match_length = self.len; // may overshoot near the end
                }

                if self.match_length <= THRESHOLD {
                    self.match_length = 1;
                    self.code_buf[0] |= self.mask; // literal flag
                    self.code_buf[self.code_len] = self.ring[self.r];
                    self.code_len += 1;
                } else {
                    // 12-bit window position, 4-bit biased length.
                    self.code_buf[self.code_len] = self.match_position as u8;
                    self.code_buf[self.code_len + 1] = (((self.match_position >> 4) & 0xF0)
                        | (self.match_length - (THRESHOLD + 1)))
                        as u8;
                    self.code_len += 2;
                }

                self.mask = self.mask.wrapping_shl(1);
                if self.mask == 0 {
                    self.flush_batch(dst)?;
                }

                self.step = self.match_length;
                self.advanced = 0;
            }

            // Slide the window over the bytes just coded, reading their
            // replacements from the input.
            loop {
                if resume_slide {
                    resume_slide = false;
                } else {
                    if self.advanced >= self.step || pos >= input.len() {
                        break;
                    }
                    self.pending = input[pos];
                    pos += 1;
                    if pos >= input.len() && !last {
                        self.resume = EncodeResume::SlideWindow;
                        return Ok(());
                    }
                }

                let c = self.pending;
                self.delete_node(self.s);
                self.ring[self.s] = c;
                if self.s < MAX_MATCH - 1 {
                    // Mirror the wrap region past the end of the ring.
                    self.ring[self.s + WINDOW_SIZE] = c;
                }
                self.s = (self.s + 1) & (WINDOW_SIZE - 1);
                self.r = (self.r + 1) & (WINDOW_SIZE - 1);
                self.insert_node(self.r);
                self.advanced += 1;
            }

            // Past the end of the input the lookahead drains without
            // refilling; the window still has to slide.
            while self.advanced < self.step {
                self.advanced += 1;
                self.delete_node(self.s);
                self.s = (self.s + 1) & (WINDOW_SIZE - 1);
                self.r = (self.r + 1) & (WINDOW_SIZE - 1);
                self.len -= 1;
                if self.len > 0 {
                    self.insert_node(self.r);
                }
            }

            if self.len == 0 {
                break;
            }
        }

        if self.code_len > 1 {
            self.flush_batch(dst)?;
        }
        self.resume = EncodeResume::Idle;
        Ok(())
    }

    /// Emit the current batch: control byte plus payload.
    fn flush_batch<S: CodecStream>(&mut self, dst: &mut S) -> Result<()> {
        if let Some(k) = dst.legacy_key_byte() {
            // Legacy cipher scope: only the control byte is masked.
            self.code_buf[0] ^= k;
        }
        for i in 0..self.code_len {
            dst.put_byte(self.code_buf[i]);
        }
        if dst.has_error() {
            return Err(PackError::Io(io::Error::other(
                "write failed beneath the compressor",
            )));
        }
        self.code_buf[0] = 0;
        self.code_len = 1;
        self.mask = 1;
        Ok(())
    }

    /// Reset the 256 per-leading-byte tree roots and detach every window
    /// position. Child links of detached nodes are set on insertion.
    fn init_tree(&mut self) {
        for root in self.rson[WINDOW_SIZE + 1..].iter_mut() {
            *root = NIL;
        }
        for d in self.dad[..WINDOW_SIZE].iter_mut() {
            *d = NIL;
        }
    }

    /// Insert the string `ring[r..r + F]` into its tree and record the
    /// longest match found on the way down. A full-length match replaces
    /// the old node with the new one (the old one leaves the window first).
    fn insert_node(&mut self, r: usize) {
        let mut cmp: i32 = 1;
        let mut p = WINDOW_SIZE + 1 + usize::from(self.ring[r]);
        self.rson[r] = NIL;
        self.lson[r] = NIL;
        self.match_length = 0;

        loop {
            if cmp >= 0 {
                if self.rson[p] != NIL {
                    p = usize::from(self.rson[p]);
                } else {
                    self.rson[p] = r as u16;
                    self.dad[r] = p as u16;
                    return;
                }
            } else if self.lson[p] != NIL {
                p = usize::from(self.lson[p]);
            } else {
                self.lson[p] = r as u16;
                self.dad[r] = p as u16;
                return;
            }

            let mut i = 1;
            while i < MAX_MATCH {
                cmp = i32::from(self.ring[r + i]) - i32::from(self.ring[p + i]);
                if cmp != 0 {
                    break;
                }
                i += 1;
            }

            if i > self.match_length {
                self.match_position = p;
                self.match_length = i;
                if i >= MAX_MATCH {
                    break;
                }
            }
        }

        // Replace p with r.
        self.dad[r] = self.dad[p];
        self.lson[r] = self.lson[p];
        self.rson[r] = self.rson[p];
        self.dad[usize::from(self.lson[p])] = r as u16;
        self.dad[usize::from(self.rson[p])] = r as u16;
        let dp = usize::from(self.dad[p]);
        if self.rson[dp] == p as u16 {
            self.rson[dp] = r as u16;
        } else {
            self.lson[dp] = r as u16;
        }
        self.dad[p] = NIL;
    }

    /// Remove window position `p` from its tree, if present.
    fn delete_node(&mut self, p: usize) {
        if self.dad[p] == NIL {
            return; // not in a tree
        }

        let q: usize;
        if self.rson[p] == NIL {
            q = usize::from(self.lson[p]);
        } else if self.lson[p] == NIL {
            q = usize::from(self.rson[p]);
        } else {
            // Two children: splice in the rightmost node of the left
            // subtree.
            let mut qq = usize::from(self.lson[p]);
            if self.rson[qq] != NIL {
                while self.rson[qq] != NIL {
                    qq = usize::from(self.rson[qq]);
                }
                self.rson[usize::from(self.dad[qq])] = self.lson[qq];
                self.dad[usize::from(self.lson[qq])] = self.dad[qq];
                self.lson[qq] = self.lson[p];
                self.dad[usize::from(self.lson[p])] = qq as u16;
            }
            self.rson[qq] = self.rson[p];
            self.dad[usize::from(self.rson[p])] = qq as u16;
            q = qq;
        }

        self.dad[q] = self.dad[p];
        let dp = usize::from(self.dad[p]);
        if self.rson[dp] == p as u16 {
            self.rson[dp] = q as u16;
        } else {
            self.lson[dp] = q as u16;
        }
        self.dad[p] = NIL;
    }
}

impl Default for LzssEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LzssEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzssEncoder")
            .field("resume", &self.resume)
            .field("len", &self.len)
            .field("r", &self.r)
            .field("s", &self.s)
            .finish_non_exhaustive()
    }
}
