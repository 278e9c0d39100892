//! Repeating-key XOR cipher primitives.
//!
//! This is a nominal anti-tampering veneer, not real cryptography: there is
//! no chaining mode, so equal plaintext runs produce visibly equal ciphertext
//! runs, and the key is recoverable from known plaintext. Treat it as an
//! obfuscation layer for data files, nothing more.
//!
//! A [`Password`] is supplied explicitly at stream-open time; every opened
//! stream clones it into a private [`KeyStream`] whose cursor then advances
//! independently of any other stream.

/// Maximum number of key bytes retained by a [`Password`].
pub const MAX_PASSWORD_LEN: usize = 255;

/// An XOR cipher key: 1 to 255 bytes.
///
/// Longer inputs are truncated to 255 bytes. Constructing a `Password` from
/// an empty input yields `None`, which callers use to express "no cipher".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Password(Vec<u8>);

impl Password {
    /// Create a password from raw bytes, truncating at 255 bytes.
    ///
    /// Returns `None` for empty input.
    pub fn new(key: impl AsRef<[u8]>) -> Option<Self> {
        let key = key.as_ref();
        if key.is_empty() {
            return None;
        }
        let mut data = key.to_vec();
        data.truncate(MAX_PASSWORD_LEN);
        Some(Self(data))
    }

    /// The key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of key bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with slice types.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A password plus a wrapping cursor: the per-stream keystream state.
///
/// Each stream owns its own `KeyStream`, cloned from the caller's
/// [`Password`] when the stream is opened, so sibling streams never perturb
/// each other's cursor. The chunk protocol clones and resynchronizes cursors
/// explicitly in legacy-cipher mode.
#[derive(Debug, Clone)]
pub struct KeyStream {
    key: Vec<u8>,
    pos: usize,
}

impl KeyStream {
    /// Create a keystream at cursor position zero.
    pub fn new(password: &Password) -> Self {
        Self {
            key: password.0.clone(),
            pos: 0,
        }
    }

    /// Current cursor position within the key.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to `pos` modulo the key length.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos % self.key.len();
    }

    /// Produce the next key byte, advancing and wrapping the cursor.
    pub fn next_byte(&mut self) -> u8 {
        let b = self.key[self.pos];
        self.pos += 1;
        if self.pos >= self.key.len() {
            self.pos = 0;
        }
        b
    }

    /// XOR `buf` in place against the keystream, advancing the cursor.
    pub fn apply(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b ^= self.next_byte();
        }
    }
}

/// Mask a magic-number header value with the current key.
///
/// The mask folds the whole key in two passes: first, every key byte XORed
/// into the 32-bit mask at a byte lane chosen by its index modulo 4; second,
/// a rolling XOR of four key bytes (wrapping within the key) into the lanes
/// from most to least significant. New-format headers additionally flip the
/// mask with the constant 42, which is what distinguishes them from
/// legacy-cipher headers carrying the same key.
///
/// With no key the value passes through unchanged.
pub fn encrypt_id(x: u32, key: Option<&Password>, new_format: bool) -> u32 {
    let Some(key) = key else {
        return x;
    };
    let key = key.as_bytes();

    let mut mask: u32 = 0;
    for (i, &b) in key.iter().enumerate() {
        mask ^= u32::from(b) << ((i & 3) * 8);
    }

    let mut pos = 0;
    for i in 0..4 {
        mask ^= u32::from(key[pos]) << (24 - i * 8);
        pos += 1;
        if pos >= key.len() {
            pos = 0;
        }
    }

    if new_format {
        mask ^= 42;
    }

    x ^ mask
}
