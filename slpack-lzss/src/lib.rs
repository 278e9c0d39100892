//! Resumable LZSS codec for slpack packfiles.
//!
//! LZSS (Lempel-Ziv-Storer-Szymanski) over a 4 KB ring-buffer window:
//! runs of bytes that occurred within the last 4096 bytes are replaced by a
//! 12-bit position / 4-bit length pair; everything else is sent as a literal.
//! Literals and pairs are grouped into batches of eight units behind one
//! control byte whose bits say which is which.
//!
//! Both directions are *resumable*: a call may be handed less input (encoder)
//! or less output space (decoder) than the logical unit of work it is in the
//! middle of, and suspends with enough saved state to continue on the next
//! call exactly as if it had never stopped. Chunked and one-shot processing
//! produce byte-identical streams.
//!
//! The codec does not own its I/O: it pulls and pushes bytes through the
//! [`CodecStream`] seam, which the container layer implements on the parent
//! stream of a compressed layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decode;
pub mod encode;

pub use decode::LzssDecoder;
pub use encode::LzssEncoder;

pub use slpack_core::CodecStream;

/// Sliding-window size in bytes (N). Positions are encoded in 12 bits.
pub const WINDOW_SIZE: usize = 4096;

/// Upper limit for a match length (F), including the lookahead.
pub const MAX_MATCH: usize = 18;

/// Matches of this length or shorter are sent as literals: a position/length
/// pair costs two bytes, so copying fewer than three bytes never pays.
pub const THRESHOLD: usize = 2;
