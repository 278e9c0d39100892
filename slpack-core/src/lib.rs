//! # slpack Core
//!
//! Core components for the slpack container library.
//!
//! This crate provides the building blocks shared by the codec and container
//! layers:
//!
//! - [`error`]: Error types
//! - [`cipher`]: the repeating-key XOR cipher and header-mask derivation
//! - [`traits`]: the seam between the LZSS codec and the stream layer
//!
//! ## Architecture
//!
//! slpack is a layered stream stack:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ L3: Chunk protocol                                     │
//! │     length-framed, optionally compressed sub-streams   │
//! ├────────────────────────────────────────────────────────┤
//! │ L2: PackFile stream                                    │
//! │     buffering, keystream XOR, byte accounting          │
//! ├────────────────────────────────────────────────────────┤
//! │ L1: Codec                                              │
//! │     resumable LZSS over a CodecStream seam             │
//! ├────────────────────────────────────────────────────────┤
//! │ L0: This crate                                         │
//! │     errors, cipher, traits                             │
//! └────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use cipher::{KeyStream, Password, encrypt_id};
pub use error::{PackError, Result};
pub use traits::CodecStream;
