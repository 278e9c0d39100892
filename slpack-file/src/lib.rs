//! # slpack File
//!
//! Layered packfile container for slpack.
//!
//! A [`PackFile`] is a buffered byte stream over a disk file, a custom
//! backend, or another `PackFile`. Streams stack: a compressed stream
//! reads and writes through a raw parent stream, and a chunk reads and
//! writes through whatever stream it was opened on. Each layer owns the
//! one beneath it.
//!
//! ```text
//!   PackFile (chunk, maybe compressed)
//!      └── PackFile (compressed stream)
//!             └── PackFile (raw, maybe encrypted)
//!                    └── std::fs::File
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use slpack_file::{OpenMode, PackFile};
//!
//! let mut out = PackFile::open("scores.dat", OpenMode::WritePacked).unwrap();
//! assert!(out.put_u32_le(12345));
//! out.close().unwrap();
//!
//! let mut input = PackFile::open("scores.dat", OpenMode::ReadPacked).unwrap();
//! assert_eq!(input.get_u32_le(), Some(12345));
//! ```
//!
//! ## Chunks
//!
//! [`PackFile::open_chunk`] nests a length-framed sub-stream inside a
//! stream, optionally compressed on its own. Opening a chunk consumes the
//! parent; [`PackFile::close_chunk`] gives it back, so at most one chunk
//! can be active per stream and the types enforce it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod chunk;
mod file;
mod mode;
mod temp;
mod vtable;

pub use file::{BUF_SIZE, NOPACK_MAGIC, PACK_MAGIC, PackFile};
pub use mode::OpenMode;
pub use vtable::PackOps;

// The cipher types appear in this crate's public API.
pub use slpack_core::{PackError, Password, Result};
